//! Benchmark CSV output.
//!
//! One row per recorded frame with the columns
//! `vertices,cubes,threads,frame,updateVBO,startup` (milliseconds for the
//! timing columns). Overwrite mode truncates the file and writes the
//! header; append mode adds rows to whatever is already there.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

pub struct Bench {
    file: File,
    num_vertices: usize,
    num_cubes: usize,
    num_threads: usize,
    frame_ms: f32,
    update_vbo_ms: f32,
    startup_ms: f32,
}

impl Bench {
    pub fn open<P: AsRef<Path>>(path: P, overwrite: bool) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true).write(true);
        if overwrite {
            log::info!("overwriting {}", path.as_ref().display());
            options.truncate(true);
        } else {
            options.append(true);
        }
        let mut file = options.open(path)?;
        if overwrite {
            writeln!(file, "vertices,cubes,threads,frame,updateVBO,startup")?;
        }

        Ok(Self {
            file,
            num_vertices: 0,
            num_cubes: 0,
            num_threads: 0,
            frame_ms: 0.0,
            update_vbo_ms: 0.0,
            startup_ms: 0.0,
        })
    }

    pub fn num_vertices(&mut self, num: usize) {
        self.num_vertices = num;
    }

    pub fn num_cubes(&mut self, num: usize) {
        self.num_cubes = num;
    }

    pub fn num_threads(&mut self, num: usize) {
        self.num_threads = num;
    }

    /// Starts a measurement; pass the result to one of the `*_time` sinks.
    pub fn start() -> Instant {
        Instant::now()
    }

    pub fn frame_time(&mut self, since: Instant) {
        self.frame_ms = Self::elapsed_ms(since);
    }

    pub fn update_vbo_time(&mut self, since: Instant) {
        self.update_vbo_ms = Self::elapsed_ms(since);
    }

    pub fn startup_time(&mut self, since: Instant) {
        self.startup_ms = Self::elapsed_ms(since);
    }

    fn elapsed_ms(since: Instant) -> f32 {
        since.elapsed().as_secs_f32() * 1000.0
    }

    /// Appends one row with the current column values.
    pub fn record(&mut self) -> io::Result<()> {
        writeln!(
            self.file,
            "{},{},{},{},{},{}",
            self.num_vertices,
            self.num_cubes,
            self.num_threads,
            self.frame_ms,
            self.update_vbo_ms,
            self.startup_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("evoke-bench-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn overwrite_writes_header_then_rows() {
        let path = temp_path("overwrite.csv");
        {
            let mut bench = Bench::open(&path, true).unwrap();
            bench.num_vertices(128);
            bench.num_cubes(16);
            bench.num_threads(2);
            bench.record().unwrap();
        }
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "vertices,cubes,threads,frame,updateVBO,startup");
        assert!(lines[1].starts_with("128,16,2,"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn append_adds_rows_without_a_header() {
        let path = temp_path("append.csv");
        {
            let mut bench = Bench::open(&path, true).unwrap();
            bench.record().unwrap();
        }
        {
            let mut bench = Bench::open(&path, false).unwrap();
            bench.num_cubes(4);
            bench.record().unwrap();
        }
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.iter().filter(|l| l.starts_with("vertices")).count(), 1);
        fs::remove_file(&path).unwrap();
    }
}
