//! OBJ subset parser: `v`, `vn`, `vt`, triangle-only `f`, `usemtl`.
//!
//! Malformed lines never abort a parse; they are reported as [`ParseWarning`]s
//! and skipped. Every face corner becomes its own vertex (no deduplication),
//! and V texture coordinates are flipped to the top-left texture origin.

use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::Context;
use thiserror::Error;

use crate::mesh::{MaterialRange, Mesh, MeshVertex};

/// Normal given to corners whose face did not commit normals.
const DEFAULT_NORMAL: [f32; 3] = [0.0, 0.0, 1.0];
/// Raw texture coordinate given to corners whose face did not commit UVs.
const DEFAULT_TEXCOORD: [f32; 2] = [0.0, 0.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    Position,
    TexCoord,
    Normal,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Attribute::Position => "position",
            Attribute::TexCoord => "texture coordinate",
            Attribute::Normal => "normal",
        })
    }
}

#[derive(Debug, Error)]
pub enum ObjError {
    #[error("failed to read OBJ data")]
    Io(#[from] io::Error),
    #[error("OBJ data is empty")]
    Empty,
    #[error("face references {attribute} {index}, but only {available} were declared")]
    IndexOutOfRange {
        attribute: Attribute,
        index: u32,
        available: usize,
    },
    #[error("too many face corners for 32-bit indices")]
    TooManyVertices,
}

/// A non-fatal problem on one line of input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseWarning {
    /// Set by path-based loading; `None` for in-memory sources.
    pub filename: Option<PathBuf>,
    /// 1-based.
    pub line: usize,
    pub message: String,
}

impl ParseWarning {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            filename: None,
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(path) => write!(f, "{}:{}: {}", path.display(), self.line, self.message),
            None => write!(f, "line {}: {}", self.line, self.message),
        }
    }
}

/// Result of a successful parse.
#[derive(Clone, Debug)]
pub struct ParsedObj {
    pub mesh: Mesh,
    pub warnings: Vec<ParseWarning>,
}

/// Load an OBJ mesh from a file path. Warnings are stamped with the path.
pub fn load_obj_from_path(path: impl AsRef<Path>) -> anyhow::Result<ParsedObj> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open OBJ file: {}", path.display()))?;
    let mut parsed = parse_obj(BufReader::new(file))
        .with_context(|| format!("Failed to parse OBJ file: {}", path.display()))?;
    for warning in &mut parsed.warnings {
        warning.filename = Some(path.to_path_buf());
    }
    Ok(parsed)
}

/// Convenience helper to parse an OBJ string literal.
pub fn load_obj_from_str(contents: &str) -> Result<ParsedObj, ObjError> {
    parse_obj(io::Cursor::new(contents))
}

/// Parse `\n`-delimited OBJ records from any [`BufRead`].
pub fn parse_obj<R: BufRead>(reader: R) -> Result<ParsedObj, ObjError> {
    let mut acc = ObjAccumulator::default();
    let mut warnings = Vec::new();

    for (index, record) in reader.split(b'\n').enumerate() {
        let record = record?;
        // Bytes that are not UTF-8 (Latin-1 exporter comments, mostly) are
        // replaced rather than failing the whole file.
        let decoded = String::from_utf8_lossy(&record);
        let line = decoded.strip_suffix('\r').unwrap_or(&decoded);
        let line_no = index + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Single-space tokenisation: doubled spaces yield empty tokens and
        // trip the arity checks below.
        let components: Vec<&str> = line.split(' ').collect();
        let args = &components[1..];

        match components[0] {
            "v" => {
                if args.len() != 3 {
                    warnings.push(ParseWarning::new(
                        line_no,
                        "vertex must have 3 space-separated components",
                    ));
                    continue;
                }
                let position =
                    parse_floats(args, "could not parse vertex component", line_no, &mut warnings);
                acc.positions.push(position);
            }
            "vn" => {
                if args.len() != 3 {
                    warnings.push(ParseWarning::new(
                        line_no,
                        "vertex normal must have 3 space-separated components",
                    ));
                    continue;
                }
                let normal =
                    parse_floats(args, "could not parse vertex normal", line_no, &mut warnings);
                acc.normals.push(normal);
            }
            "vt" => {
                if args.len() != 2 {
                    warnings.push(ParseWarning::new(
                        line_no,
                        "texture coordinates must have 2 space-separated components",
                    ));
                    continue;
                }
                let texcoord = parse_floats(
                    args,
                    "could not parse texture coordinate",
                    line_no,
                    &mut warnings,
                );
                acc.texcoords.push(texcoord);
            }
            "f" => {
                if args.len() != 3 {
                    warnings.push(ParseWarning::new(
                        line_no,
                        "face must have 3 space-separated components",
                    ));
                    continue;
                }
                let face = parse_face([args[0], args[1], args[2]], line_no, &mut warnings);
                acc.commit_face(face);
            }
            "usemtl" => {
                if args.len() == 1 {
                    acc.use_material(args[0]);
                }
            }
            // `o`, `g`, `s`, `mtllib` and anything else are not interpreted.
            _ => {}
        }
    }

    let mesh = acc.finish()?;
    Ok(ParsedObj { mesh, warnings })
}

/// Parse exactly `N` floats. A bad token leaves its slot at zero and emits
/// one warning; the other components still count.
fn parse_floats<const N: usize>(
    args: &[&str],
    what: &str,
    line_no: usize,
    warnings: &mut Vec<ParseWarning>,
) -> [f32; N] {
    let mut out = [0.0; N];
    for (slot, token) in out.iter_mut().zip(args) {
        match token.parse::<f32>() {
            Ok(value) => *slot = value,
            Err(_) => warnings.push(ParseWarning::new(line_no, format!("{what}: {token}"))),
        }
    }
    out
}

/// Raw 1-based indices for one triangle, per attribute kind.
#[derive(Debug, Default)]
struct FaceIndices {
    positions: [Option<u32>; 3],
    texcoords: [Option<u32>; 3],
    normals: [Option<u32>; 3],
}

fn parse_face(groups: [&str; 3], line_no: usize, warnings: &mut Vec<ParseWarning>) -> FaceIndices {
    let mut face = FaceIndices::default();

    for (corner, group) in groups.into_iter().enumerate() {
        let parts: Vec<&str> = group.split('/').collect();

        match parts[0].parse::<u32>() {
            Ok(v) => face.positions[corner] = Some(v),
            Err(_) => warnings.push(ParseWarning::new(
                line_no,
                format!("could not parse face vertex index: {group}"),
            )),
        }

        if let Some(token) = parts.get(1).filter(|t| !t.is_empty()) {
            match token.parse::<u32>() {
                Ok(v) => face.texcoords[corner] = Some(v),
                Err(_) => warnings.push(ParseWarning::new(
                    line_no,
                    format!("could not parse face vertex texture coordinate index: {group}"),
                )),
            }
        }

        if let Some(token) = parts.get(2).filter(|t| !t.is_empty()) {
            match token.parse::<u32>() {
                Ok(v) => face.normals[corner] = Some(v),
                Err(_) => warnings.push(ParseWarning::new(
                    line_no,
                    format!("could not parse face vertex normal index: {group}"),
                )),
            }
        }

        if parts.len() > 3 {
            warnings.push(ParseWarning::new(
                line_no,
                format!("too many attributes in face element: {group}"),
            ));
        }
    }

    face
}

/// `Some` only when every corner of the face has the attribute.
#[inline]
fn all_corners(values: [Option<u32>; 3]) -> Option<[u32; 3]> {
    Some([values[0]?, values[1]?, values[2]?])
}

#[derive(Clone, Copy, Debug)]
struct Corner {
    position: u32,
    texcoord: Option<u32>,
    normal: Option<u32>,
}

#[derive(Clone, Debug)]
struct MaterialMarker {
    name: String,
    start: u32,
}

/// Parse-time state; consumed once by [`ObjAccumulator::finish`].
#[derive(Debug, Default)]
struct ObjAccumulator {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    corners: Vec<Corner>,
    materials: Vec<MaterialMarker>,
}

impl ObjAccumulator {
    /// Attribute kinds commit independently: a face keeps its UVs only if all
    /// three corners parsed one, same for normals. Without three positions
    /// the face contributes nothing.
    fn commit_face(&mut self, face: FaceIndices) {
        let Some(positions) = all_corners(face.positions) else {
            return;
        };
        let texcoords = all_corners(face.texcoords);
        let normals = all_corners(face.normals);

        for corner in 0..3 {
            self.corners.push(Corner {
                position: positions[corner],
                texcoord: texcoords.map(|t| t[corner]),
                normal: normals.map(|n| n[corner]),
            });
        }
    }

    fn use_material(&mut self, name: &str) {
        self.materials.push(MaterialMarker {
            name: name.to_owned(),
            start: self.corners.len() as u32,
        });
    }

    fn finish(self) -> Result<Mesh, ObjError> {
        let count = u32::try_from(self.corners.len()).map_err(|_| ObjError::TooManyVertices)?;

        let mut vertices = Vec::with_capacity(self.corners.len());
        for corner in &self.corners {
            let position = resolve(&self.positions, corner.position, Attribute::Position)?;
            let normal = match corner.normal {
                Some(i) => resolve(&self.normals, i, Attribute::Normal)?,
                None => DEFAULT_NORMAL,
            };
            let [u, v] = match corner.texcoord {
                Some(i) => resolve(&self.texcoords, i, Attribute::TexCoord)?,
                None => DEFAULT_TEXCOORD,
            };
            vertices.push(MeshVertex::new(position, normal, [u, 1.0 - v]));
        }
        let indices: Vec<u32> = (0..count).collect();

        if vertices.is_empty() || indices.is_empty() {
            return Err(ObjError::Empty);
        }

        let materials = build_material_ranges(&self.materials, count);
        Ok(Mesh::new(vertices, indices, materials))
    }
}

/// Resolve a 1-based OBJ index.
fn resolve<T: Copy>(values: &[T], index: u32, attribute: Attribute) -> Result<T, ObjError> {
    index
        .checked_sub(1)
        .and_then(|i| values.get(i as usize))
        .copied()
        .ok_or(ObjError::IndexOutOfRange {
            attribute,
            index,
            available: values.len(),
        })
}

/// Each range ends where the next marker starts; the last runs to the end.
fn build_material_ranges(markers: &[MaterialMarker], index_count: u32) -> Vec<MaterialRange> {
    markers
        .iter()
        .enumerate()
        .map(|(i, marker)| MaterialRange {
            name: marker.name.clone(),
            start: marker.start,
            end: markers.get(i + 1).map_or(index_count, |next| next.start),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const TRIANGLE: &str = "v 0 0 0\n\
                            v 1 0 0\n\
                            v 0 1 0\n\
                            vn 0 0 1\n\
                            vt 0 0\n\
                            vt 1 0\n\
                            vt 0 1\n\
                            usemtl stone\n\
                            f 1/1/1 2/2/1 3/3/1\n";

    #[test]
    fn parse_simple_triangle() {
        let parsed = load_obj_from_str(TRIANGLE).expect("parse triangle");
        let mesh = &parsed.mesh;
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(
            mesh.materials,
            vec![MaterialRange {
                name: "stone".into(),
                start: 0,
                end: 3
            }]
        );
        assert!(parsed.warnings.is_empty());
        assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[1].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn uv_v_is_flipped() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
                   vt 0.25 0.1\nvt 0.5 0.75\nvt 1 1\n\
                   f 1/1 2/2 3/3\n";
        let mesh = load_obj_from_str(src).unwrap().mesh;
        let raw = [[0.25, 0.1], [0.5, 0.75], [1.0, 1.0]];
        for (vertex, [u, v]) in mesh.vertices.iter().zip(raw) {
            assert_eq!(vertex.uv, [u, 1.0 - v]);
        }
    }

    #[test]
    fn two_corner_face_is_rejected_with_one_warning() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
                   f 1 2\n\
                   f 1 2 3\n";
        let parsed = load_obj_from_str(src).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, 4);
        assert_eq!(
            parsed.warnings[0].message,
            "face must have 3 space-separated components"
        );
        // Only the well-formed face contributed corners.
        assert_eq!(parsed.mesh.vertices.len(), 3);
    }

    #[test]
    fn only_malformed_face_yields_empty_error() {
        let src = "v 0 0 0\nv 1 0 0\nf 1 2\n";
        assert!(matches!(load_obj_from_str(src), Err(ObjError::Empty)));
    }

    #[test]
    fn geometry_free_input_is_an_error() {
        assert!(matches!(load_obj_from_str(""), Err(ObjError::Empty)));
        assert!(matches!(
            load_obj_from_str("# nothing\nv 1 2 3\n"),
            Err(ObjError::Empty)
        ));
    }

    #[test]
    fn bad_normal_drops_normals_for_whole_face_only() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
                   vn 1 0 0\n\
                   f 1//1 2//x 3//1\n";
        let parsed = load_obj_from_str(src).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(
            parsed.warnings[0].message,
            "could not parse face vertex normal index: 2//x"
        );
        // Positions still committed, normals fell back to the default.
        assert_eq!(parsed.mesh.vertices.len(), 3);
        assert!(
            parsed
                .mesh
                .vertices
                .iter()
                .all(|v| v.normal == DEFAULT_NORMAL)
        );
        assert_eq!(parsed.mesh.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn bad_position_index_drops_face_and_continues() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
                   f 1 ? 3\n\
                   f 3 2 1\n";
        let parsed = load_obj_from_str(src).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, 4);
        assert_eq!(parsed.mesh.indices.len(), 3);
        assert_eq!(parsed.mesh.vertices[0].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn vertex_arity_and_component_warnings() {
        let src = "v 1 2\n\
                   v 1 nope 3\n\
                   v 4 5 6\n\
                   vt 0.5\n\
                   vn 0 1 0 0\n\
                   f 1 2 2\n";
        let parsed = load_obj_from_str(src).unwrap();
        let messages: Vec<_> = parsed.warnings.iter().map(|w| w.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "vertex must have 3 space-separated components",
                "could not parse vertex component: nope",
                "texture coordinates must have 2 space-separated components",
                "vertex normal must have 3 space-separated components",
            ]
        );
        // The half-parsed vertex is still appended (bad slot zeroed) so
        // later indices keep their meaning.
        assert_eq!(parsed.mesh.vertices[0].position, [1.0, 0.0, 3.0]);
        assert_eq!(parsed.mesh.vertices[1].position, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn floats_round_trip() {
        let values = [0.1f32, -3.75, 1.0e-7, 123456.79, f32::MAX, -0.0];
        let mut src = String::new();
        for chunk in values.chunks(3) {
            src.push_str(&format!("v {} {} {}\n", chunk[0], chunk[1], chunk[2]));
        }
        src.push_str("f 1 2 1\n");
        let mesh = load_obj_from_str(&src).unwrap().mesh;
        assert_eq!(mesh.vertices[0].position, [values[0], values[1], values[2]]);
        assert_eq!(mesh.vertices[1].position, [values[3], values[4], values[5]]);
    }

    #[test]
    fn unknown_directives_and_comments_are_silent() {
        let src = "# header\n\
                   o level\n\
                   mtllib level.mtl\n\
                   s off\n\
                   \n\
                   v 0 0 0\nv 1 0 0\nv 0 1 0\n\
                   usemtl\n\
                   f 1 2 3\n";
        let parsed = load_obj_from_str(src).unwrap();
        assert!(parsed.warnings.is_empty());
        assert!(parsed.mesh.materials.is_empty());
    }

    #[test]
    fn too_many_face_attributes_warns_but_keeps_face() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1/1/1/1 2 3\n";
        let parsed = load_obj_from_str(src).unwrap();
        // Missing texcoord 1 is never consulted: the face has no complete UV set.
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(
            parsed.warnings[0].message,
            "too many attributes in face element: 1/1/1/1"
        );
        assert_eq!(parsed.mesh.vertices.len(), 3);
    }

    #[test]
    fn material_ranges_partition_indices_in_declaration_order() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
                   f 1 2 3\n\
                   usemtl wall\n\
                   f 1 2 3\nf 1 2 3\n\
                   usemtl floor\n\
                   usemtl roof\n\
                   f 1 2 3\n";
        let mesh = load_obj_from_str(src).unwrap().mesh;
        assert_eq!(mesh.indices.len(), mesh.vertices.len());
        assert_eq!(mesh.unassigned_range(), 0..3);

        let names: Vec<_> = mesh.materials.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["wall", "floor", "roof"]);
        assert_eq!(mesh.materials[0].indices(), 3..9);
        assert!(mesh.materials[1].is_empty());
        assert_eq!(mesh.materials[2].indices(), 9..12);

        for pair in mesh.materials.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(mesh.materials.last().unwrap().end, mesh.index_count());
    }

    #[test]
    fn out_of_range_index_is_a_clear_error() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n";
        assert!(matches!(
            load_obj_from_str(src),
            Err(ObjError::IndexOutOfRange {
                attribute: Attribute::Position,
                index: 4,
                available: 3
            })
        ));

        let zero = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1/0 2/0 3/0\n";
        assert!(matches!(
            load_obj_from_str(zero),
            Err(ObjError::IndexOutOfRange {
                attribute: Attribute::TexCoord,
                index: 0,
                ..
            })
        ));
    }

    #[test]
    fn path_loading_stamps_warnings_with_filename() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{TRIANGLE}v 1 2\n").unwrap();

        let parsed = load_obj_from_path(file.path()).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].filename.as_deref(), Some(file.path()));
        assert_eq!(parsed.warnings[0].line, 10);
        assert!(
            parsed.warnings[0]
                .to_string()
                .ends_with(":10: vertex must have 3 space-separated components")
        );
    }

    #[test]
    fn non_utf8_comment_does_not_stop_the_parse() {
        let mut src = b"# exported by caf\xe9 tool\r\n".to_vec();
        src.extend_from_slice(TRIANGLE.as_bytes());

        let parsed = parse_obj(io::Cursor::new(src)).unwrap();
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.mesh.indices, vec![0, 1, 2]);
        assert_eq!(parsed.mesh.materials[0].name, "stone");
    }

    #[test]
    fn non_utf8_bytes_in_a_directive_only_skip_that_line() {
        let mut src = TRIANGLE.as_bytes().to_vec();
        src.extend_from_slice(b"v 1 \xff 0\r\nv 2 2 2\r\n");

        let parsed = parse_obj(io::Cursor::new(src)).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, 10);
        assert!(parsed.warnings[0].message.starts_with("could not parse vertex component"));
        assert_eq!(parsed.mesh.vertices.len(), 3);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_obj_from_path(dir.path().join("missing.obj")).is_err());
    }
}
