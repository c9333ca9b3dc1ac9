//! STL emitters (ASCII and binary) over tessellated model meshes.

use dcad_tessellate::MeshData;

/// Format a real for ASCII STL: uppercase-E scientific, trimmed mantissa.
fn fmt_real(x: f64) -> String {
    let s = format!("{:.14E}", x);
    let epos = s.find('E').unwrap_or(s.len());
    let (mant, exp) = s.split_at(epos);
    let mant = mant.trim_end_matches('0');
    if mant.ends_with('.') {
        format!("{mant}0{exp}")
    } else {
        format!("{mant}{exp}")
    }
}

/// Per-facet normal from the triangle's vertices.
fn facet_normal(mesh: &MeshData, i0: usize, i1: usize, i2: usize) -> [f64; 3] {
    let a = mesh.position(i0);
    let b = mesh.position(i1);
    let c = mesh.position(i2);
    let n = (b - a).cross(&(c - a));
    let len = n.norm();
    if len < 1e-30 {
        [0.0, 0.0, 0.0]
    } else {
        [n.x / len, n.y / len, n.z / len]
    }
}

/// Serialize meshes as ASCII STL.
pub fn write_stl_ascii(name: &str, meshes: &[MeshData], include_normals: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("solid {name}\n"));
    for mesh in meshes {
        for tri in mesh.indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let n = if include_normals {
                facet_normal(mesh, i0, i1, i2)
            } else {
                [0.0, 0.0, 0.0]
            };
            out.push_str(&format!(
                "  facet normal {} {} {}\n",
                fmt_real(n[0]),
                fmt_real(n[1]),
                fmt_real(n[2])
            ));
            out.push_str("    outer loop\n");
            for &i in &[i0, i1, i2] {
                let p = mesh.position(i);
                out.push_str(&format!(
                    "      vertex {} {} {}\n",
                    fmt_real(p.x),
                    fmt_real(p.y),
                    fmt_real(p.z)
                ));
            }
            out.push_str("    endloop\n");
            out.push_str("  endfacet\n");
        }
    }
    out.push_str(&format!("endsolid {name}\n"));
    out
}

/// Serialize meshes as binary STL: 80-byte header, u32 triangle count,
/// then 50 bytes per triangle.
pub fn write_stl_binary(name: &str, meshes: &[MeshData], include_normals: bool) -> Vec<u8> {
    let triangle_count: usize = meshes.iter().map(|m| m.num_triangles()).sum();

    let mut out = Vec::with_capacity(84 + triangle_count * 50);
    let mut header = [0u8; 80];
    let tag = name.as_bytes();
    let n = tag.len().min(80);
    header[..n].copy_from_slice(&tag[..n]);
    out.extend_from_slice(&header);
    out.extend_from_slice(&(triangle_count as u32).to_le_bytes());

    for mesh in meshes {
        for tri in mesh.indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let n = if include_normals {
                facet_normal(mesh, i0, i1, i2)
            } else {
                [0.0, 0.0, 0.0]
            };
            for c in n {
                out.extend_from_slice(&(c as f32).to_le_bytes());
            }
            for &i in &[i0, i1, i2] {
                let p = mesh.position(i);
                for c in [p.x, p.y, p.z] {
                    out.extend_from_slice(&(c as f32).to_le_bytes());
                }
            }
            out.extend_from_slice(&0u16.to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> MeshData {
        MeshData {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn test_ascii_framing() {
        let text = write_stl_ascii("part", &[unit_triangle()], true);
        assert!(text.starts_with("solid part\n"));
        assert!(text.ends_with("endsolid part\n"));
        assert_eq!(text.matches("facet normal").count(), 1);
        assert_eq!(text.matches("vertex").count(), 3);
        // The +Z facet normal is computed from winding.
        assert!(text.contains("facet normal 0.0E0 0.0E0 1.0E0"));
    }

    #[test]
    fn test_binary_layout() {
        let bytes = write_stl_binary("part", &[unit_triangle()], true);
        assert_eq!(bytes.len(), 84 + 50);
        assert_eq!(
            u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]),
            1
        );
        // Normal z component is 1.0f32.
        let nz = f32::from_le_bytes([bytes[92], bytes[93], bytes[94], bytes[95]]);
        assert_eq!(nz, 1.0);
    }

    #[test]
    fn test_normals_suppressed() {
        let bytes = write_stl_binary("part", &[unit_triangle()], false);
        let nz = f32::from_le_bytes([bytes[92], bytes[93], bytes[94], bytes[95]]);
        assert_eq!(nz, 0.0);
    }
}
