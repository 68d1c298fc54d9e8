//! Command-line flags shared by the example binaries.
//!
//! Validators run at parse time: out-of-range values are reported and the
//! process exits before any window or device work happens.

use std::path::PathBuf;

use clap::Parser;

/// `--num-cubes` must be a perfect square greater than 1.
pub fn parse_num_cubes(value: &str) -> Result<usize, String> {
    let value: usize = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if value <= 1 {
        return Err(format!("must be greater than 1, got {value}"));
    }
    let root = (value as f64).sqrt().round() as usize;
    if root * root != value {
        return Err(format!("must be a perfect square, got {value}"));
    }
    Ok(value)
}

/// `--num-threads` must be between 1 and 4 inclusive.
pub fn parse_num_threads(value: &str) -> Result<usize, String> {
    let value: usize = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if !(1..=4).contains(&value) {
        return Err(format!("must be between 1 and 4 inclusive, got {value}"));
    }
    Ok(value)
}

/// Flags for the cube-grid scenes.
#[derive(Parser, Debug)]
pub struct SceneFlags {
    /// Number of cubes to render; a perfect square greater than 1.
    #[arg(long = "num-cubes", default_value_t = 16, value_parser = parse_num_cubes)]
    pub num_cubes: usize,

    /// Worker threads for upload and command recording (1-4).
    #[arg(long = "num-threads", default_value_t = 1, value_parser = parse_num_threads)]
    pub num_threads: usize,

    /// Enable the Khronos validation layer.
    #[arg(long = "enable-validation")]
    pub enable_validation: bool,
}

/// Flags for the benchmark harness.
#[derive(Parser, Debug)]
pub struct BenchFlags {
    #[command(flatten)]
    pub scene: SceneFlags,

    /// Path of the CSV file benchmark rows are appended to.
    #[arg(long, default_value = "time.csv")]
    pub file: PathBuf,

    /// Overwrite the CSV file (and write the header) instead of appending.
    #[arg(long)]
    pub overwrite: bool,

    /// Frames to render per setup.
    #[arg(long = "num-frames", default_value_t = 10)]
    pub num_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_squares_pass() {
        assert_eq!(parse_num_cubes("4").unwrap(), 4);
        assert_eq!(parse_num_cubes("16").unwrap(), 16);
        assert_eq!(parse_num_cubes("81").unwrap(), 81);
    }

    #[test]
    fn non_squares_fail_before_any_setup() {
        assert!(parse_num_cubes("15").is_err());
        assert!(parse_num_cubes("2").is_err());
        assert!(parse_num_cubes("1").is_err());
        assert!(parse_num_cubes("0").is_err());
        assert!(parse_num_cubes("cubes").is_err());
    }

    #[test]
    fn thread_count_is_clamped_to_one_through_four() {
        assert!(parse_num_threads("0").is_err());
        assert_eq!(parse_num_threads("1").unwrap(), 1);
        assert_eq!(parse_num_threads("4").unwrap(), 4);
        assert!(parse_num_threads("5").is_err());
    }

    #[test]
    fn scene_flags_parse_from_args() {
        let flags =
            SceneFlags::try_parse_from(["cubes", "--num-cubes", "25", "--num-threads", "2"])
                .unwrap();
        assert_eq!(flags.num_cubes, 25);
        assert_eq!(flags.num_threads, 2);
        assert!(!flags.enable_validation);
    }

    #[test]
    fn invalid_scene_flags_are_rejected_at_parse_time() {
        assert!(SceneFlags::try_parse_from(["cubes", "--num-cubes", "15"]).is_err());
        assert!(SceneFlags::try_parse_from(["cubes", "--num-threads", "9"]).is_err());
    }
}
