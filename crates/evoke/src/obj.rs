//! OBJ model loading.
//!
//! Parses positions (`v`), texture coordinates (`vt`) and faces (`f`) into a
//! flat vertex/index pair, deduplicating vertices by (position, texcoord)
//! index pair. Normals and material statements are ignored. Faces with more
//! than three corners are triangulated as a fan.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::vertex::Vertex;

#[derive(Error, Debug)]
pub enum ObjError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Loads an OBJ file into a vertex and index array.
pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<(Vec<Vertex>, Vec<u32>), ObjError> {
    let file = File::open(path)?;
    load_obj_from(BufReader::new(file))
}

/// Loads OBJ text from any reader; see [`load_obj`].
pub fn load_obj_from<R: BufRead>(reader: R) -> Result<(Vec<Vertex>, Vec<u32>), ObjError> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut tex_coords: Vec<[f32; 2]> = Vec::new();
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    // (position index, texcoord index) -> emitted vertex index
    let mut dedup: HashMap<(usize, Option<usize>), u32> = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "v" => {
                if parts.len() < 4 {
                    return Err(ObjError::Parse(format!("short vertex line: {line}")));
                }
                let x = parse_float(parts[1])?;
                let y = parse_float(parts[2])?;
                let z = parse_float(parts[3])?;
                positions.push([x, y, z]);
            }
            "vt" => {
                if parts.len() < 3 {
                    return Err(ObjError::Parse(format!("short texcoord line: {line}")));
                }
                let u = parse_float(parts[1])?;
                let v = parse_float(parts[2])?;
                // OBJ puts the texture origin at the bottom left.
                tex_coords.push([u, 1.0 - v]);
            }
            "f" => {
                if parts.len() < 4 {
                    return Err(ObjError::Parse(format!("short face line: {line}")));
                }
                let mut corners = Vec::with_capacity(parts.len() - 1);
                for corner in &parts[1..] {
                    corners.push(resolve_corner(
                        corner,
                        &positions,
                        &tex_coords,
                        &mut vertices,
                        &mut dedup,
                    )?);
                }
                // Fan triangulation.
                for i in 1..corners.len() - 1 {
                    indices.push(corners[0]);
                    indices.push(corners[i]);
                    indices.push(corners[i + 1]);
                }
            }
            // vn, g, o, s, mtllib, usemtl and friends carry nothing we draw.
            _ => {}
        }
    }

    Ok((vertices, indices))
}

fn parse_float(token: &str) -> Result<f32, ObjError> {
    token
        .parse()
        .map_err(|_| ObjError::Parse(format!("invalid number: {token}")))
}

fn resolve_corner(
    corner: &str,
    positions: &[[f32; 3]],
    tex_coords: &[[f32; 2]],
    vertices: &mut Vec<Vertex>,
    dedup: &mut HashMap<(usize, Option<usize>), u32>,
) -> Result<u32, ObjError> {
    let mut pieces = corner.split('/');

    let pos_token = pieces.next().unwrap_or("");
    let pos_index: usize = pos_token
        .parse()
        .map_err(|_| ObjError::Parse(format!("invalid face corner: {corner}")))?;
    let pos_index = pos_index
        .checked_sub(1)
        .ok_or_else(|| ObjError::Parse(format!("face index is 0: {corner}")))?;
    if pos_index >= positions.len() {
        return Err(ObjError::Parse(format!(
            "face references missing position: {corner}"
        )));
    }

    let tex_index = match pieces.next() {
        Some("") | None => None,
        Some(token) => {
            let index: usize = token
                .parse()
                .map_err(|_| ObjError::Parse(format!("invalid face corner: {corner}")))?;
            let index = index
                .checked_sub(1)
                .ok_or_else(|| ObjError::Parse(format!("face index is 0: {corner}")))?;
            if index >= tex_coords.len() {
                return Err(ObjError::Parse(format!(
                    "face references missing texcoord: {corner}"
                )));
            }
            Some(index)
        }
    };

    let key = (pos_index, tex_index);
    if let Some(&existing) = dedup.get(&key) {
        return Ok(existing);
    }

    let mut vertex = Vertex {
        pos: positions[pos_index],
        color: [1.0, 1.0, 1.0],
        tex_coord: [0.0, 0.0],
        normal: [0.0, 0.0, 0.0],
    };
    if let Some(tex_index) = tex_index {
        vertex.tex_coord = tex_coords[tex_index];
    }

    let index = vertices.len() as u32;
    vertices.push(vertex);
    dedup.insert(key, index);
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    const QUAD: &str = "\
# two triangles sharing an edge
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/4/1
";

    #[test]
    fn quad_shares_vertices_across_faces() {
        let (vertices, indices) = load_obj_from(Cursor::new(QUAD)).unwrap();
        // Four unique (position, texcoord) pairs, six indices.
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn texcoords_are_flipped_vertically() {
        let (vertices, _) = load_obj_from(Cursor::new(QUAD)).unwrap();
        assert_relative_eq!(vertices[0].tex_coord[1], 1.0);
        assert_relative_eq!(vertices[2].tex_coord[1], 0.0);
    }

    #[test]
    fn quads_triangulate_as_a_fan() {
        let input = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";
        let (vertices, indices) = load_obj_from(Cursor::new(input)).unwrap();
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn normals_are_ignored() {
        let input = "\
v 0 0 0
v 1 0 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1
";
        let (vertices, indices) = load_obj_from(Cursor::new(input)).unwrap();
        assert_eq!(vertices.len(), 3);
        assert_eq!(indices.len(), 3);
        assert_eq!(vertices[0].normal, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn out_of_range_face_index_errors() {
        let input = "\
v 0 0 0
f 1 2 3
";
        assert!(load_obj_from(Cursor::new(input)).is_err());
    }
}
