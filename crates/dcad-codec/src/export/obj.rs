//! Wavefront OBJ emitter over tessellated model meshes.

use dcad_tessellate::MeshData;

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

/// Serialize one object per (name, mesh) pair; face indices are global and
/// 1-based per the format.
pub fn write_obj(objects: &[(String, MeshData)]) -> String {
    let mut out = String::new();
    out.push_str("# exported by dcad\n");
    let mut offset = 1usize;
    for (name, mesh) in objects {
        out.push_str(&format!("o {name}\n"));
        for i in 0..mesh.num_vertices() {
            let p = mesh.position(i);
            out.push_str(&format!(
                "v {} {} {}\n",
                fmt_real(p.x),
                fmt_real(p.y),
                fmt_real(p.z)
            ));
        }
        for n in mesh.normals.chunks_exact(3) {
            out.push_str(&format!(
                "vn {} {} {}\n",
                fmt_real(n[0]),
                fmt_real(n[1]),
                fmt_real(n[2])
            ));
        }
        for tri in mesh.indices.chunks_exact(3) {
            let (a, b, c) = (
                tri[0] as usize + offset,
                tri[1] as usize + offset,
                tri[2] as usize + offset,
            );
            out.push_str(&format!("f {a}//{a} {b}//{b} {c}//{c}\n"));
        }
        offset += mesh.num_vertices();
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
    fn test_obj_indices_are_one_based_and_global() {
        let text = write_obj(&[
            ("a".into(), unit_triangle()),
            ("b".into(), unit_triangle()),
        ]);
        assert!(text.contains("o a\n"));
        assert!(text.contains("o b\n"));
        assert!(text.contains("f 1//1 2//2 3//3\n"));
        // Second object's indices continue after the first's 3 vertices.
        assert!(text.contains("f 4//4 5//5 6//6\n"));
        assert_eq!(text.matches("\nv ").count(), 6);
    }
}
