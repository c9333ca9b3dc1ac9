//! DCA archive framing and payload serialization.
//!
//! An archive is the 32-bit little-endian magic `ARCH`, a u32 entry count,
//! then `(name, data)` entries, both length-prefixed. `manifest.json` is
//! mandatory; bodies store one `SURF` payload per face under
//! `surfaces/body_<i>_face_<j>.bin` and one `MESH` payload per body under
//! `meshes/body_<i>.bin`.

use std::path::Path;

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::ArchiveError;
use crate::manifest::{BodyMeta, Manifest, ProjectSettings, MANIFEST_VERSION};

use dcad_math::Point3;
use dcad_model::{Body, CancelToken, Color, Edge, Face, Loop, Model, Warnings};
use dcad_nurbs::{validate_knots, NurbsCurve, NurbsSurface};
use dcad_tessellate::{tessellate_body, MeshData, Quality};

/// `"ARCH"` as a little-endian u32.
pub const MAGIC: u32 = 0x4152_4348;

const TAG_MESH: &[u8; 4] = b"MESH";
const TAG_SURF: &[u8; 4] = b"SURF";
const TAG_CURV: &[u8; 4] = b"CURV";
const TAG_SKCH: &[u8; 4] = b"SKCH";

/// Options controlling archive export.
#[derive(Debug, Clone)]
pub struct DcaWriteOptions {
    /// Quality of the cached render meshes.
    pub quality: Quality,
    /// Application recorded in the manifest.
    pub application: String,
}

impl Default for DcaWriteOptions {
    fn default() -> Self {
        Self {
            quality: Quality::Standard,
            application: "dcad".into(),
        }
    }
}

/// The product of reading an archive.
#[derive(Debug)]
pub struct DcaImport {
    /// The reconstructed model.
    pub model: Model,
    /// Cached render meshes, one per body (empty when absent).
    pub meshes: Vec<MeshData>,
    /// Recoverable problems encountered along the way.
    pub warnings: Vec<String>,
}

/// Write a model to a DCA archive file in one call.
pub fn write_dca(
    model: &Model,
    path: impl AsRef<Path>,
    options: &DcaWriteOptions,
) -> Result<(), ArchiveError> {
    let bytes = write_dca_to_vec(model, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Serialize a model to archive bytes.
pub fn write_dca_to_vec(model: &Model, options: &DcaWriteOptions) -> Result<Vec<u8>, ArchiveError> {
    let manifest = Manifest {
        version: MANIFEST_VERSION,
        project: ProjectSettings {
            name: model.name.clone(),
            units: "mm".into(),
            application: options.application.clone(),
        },
        bodies: model
            .bodies
            .iter()
            .map(|b| BodyMeta {
                name: b.name.clone(),
                color: [b.color.r, b.color.g, b.color.b],
                is_solid: b.is_solid,
                face_count: b.faces.len() as u32,
            })
            .collect(),
        sketches: Vec::new(),
    };

    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    entries.push(("manifest.json".into(), serde_json::to_vec(&manifest)?));

    for (i, body) in model.bodies.iter().enumerate() {
        for (j, face) in body.faces.iter().enumerate() {
            entries.push((
                format!("surfaces/body_{i}_face_{j}.bin"),
                encode_face(face),
            ));
        }
        entries.push((
            format!("meshes/body_{i}.bin"),
            encode_mesh(&tessellate_body(body, options.quality)),
        ));
    }

    let mut w = ByteWriter::new();
    w.write_u32(MAGIC);
    w.write_u32(entries.len() as u32);
    for (name, data) in &entries {
        w.write_string(name);
        w.write_u32(data.len() as u32);
        w.write_bytes(data);
    }
    Ok(w.into_vec())
}

/// Read a DCA archive file.
pub fn read_dca(path: impl AsRef<Path>) -> Result<DcaImport, ArchiveError> {
    let data = std::fs::read(path)?;
    read_dca_from_buffer(&data, &CancelToken::new())
}

/// Read a DCA archive from bytes.
pub fn read_dca_from_buffer(data: &[u8], cancel: &CancelToken) -> Result<DcaImport, ArchiveError> {
    let mut warnings = Warnings::new();
    let mut r = ByteReader::new(data);

    let magic = r.read_u32()?;
    if magic != MAGIC {
        return Err(ArchiveError::Malformed(format!(
            "bad magic 0x{magic:08X}, expected 0x{MAGIC:08X}"
        )));
    }
    let count = r.read_u32()? as usize;

    let mut entries: Vec<(String, &[u8])> = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        let name = r.read_string()?;
        let len = r.read_u32()? as usize;
        let payload = r.read_bytes(len)?;
        entries.push((name, payload));
    }

    let manifest_bytes = entries
        .iter()
        .find(|(name, _)| name == "manifest.json")
        .map(|(_, data)| *data)
        .ok_or(ArchiveError::MissingManifest)?;
    let manifest: Manifest = serde_json::from_slice(manifest_bytes)?;
    if manifest.version != MANIFEST_VERSION {
        warnings.push(format!(
            "manifest version {} differs from supported {MANIFEST_VERSION}",
            manifest.version
        ));
    }

    let lookup = |name: &str| -> Option<&[u8]> {
        entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| *data)
    };

    let mut model = Model::new(manifest.project.name.clone());
    let mut meshes = Vec::new();

    for (i, meta) in manifest.bodies.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        let mut body = Body::new(&meta.name);
        body.is_solid = meta.is_solid;
        body.color = Color::new(meta.color[0], meta.color[1], meta.color[2]);

        for j in 0..meta.face_count {
            let name = format!("surfaces/body_{i}_face_{j}.bin");
            match lookup(&name) {
                Some(payload) => match decode_face(payload) {
                    Ok(face) => body.faces.push(face),
                    Err(e) => return Err(e),
                },
                None => warnings.push(format!("missing entry {name}")),
            }
        }

        let mesh_name = format!("meshes/body_{i}.bin");
        match lookup(&mesh_name) {
            Some(payload) => meshes.push(decode_mesh(payload)?),
            None => meshes.push(MeshData::new()),
        }

        model.bodies.push(body);
    }

    for (name, payload) in &entries {
        if name.starts_with("sketches/") {
            // Sketch geometry lives outside the codec model.
            let mut sk = ByteReader::new(payload);
            if sk.expect_tag(TAG_SKCH).is_err() {
                warnings.push(format!("entry {name}: not a sketch payload"));
            } else {
                warnings.push(format!("entry {name}: sketches are not imported"));
            }
        }
    }

    Ok(DcaImport {
        model,
        meshes,
        warnings: warnings.into_messages(),
    })
}

// =============================================================================
// Payload encoding
// =============================================================================

fn encode_curve(w: &mut ByteWriter, curve: &NurbsCurve) {
    w.write_u32(curve.degree as u32);
    w.write_u32(curve.control_points.len() as u32);
    w.write_f64_vec(&curve.knots);
    match &curve.weights {
        Some(weights) => {
            w.write_u8(1);
            w.write_f64_vec(weights);
        }
        None => w.write_u8(0),
    }
    let mut coords = Vec::with_capacity(curve.control_points.len() * 3);
    for p in &curve.control_points {
        coords.extend_from_slice(&[p.x, p.y, p.z]);
    }
    w.write_f64_vec(&coords);
}

fn decode_curve(r: &mut ByteReader) -> Result<NurbsCurve, ArchiveError> {
    let degree = r.read_u32()? as usize;
    let n = r.read_u32()? as usize;
    let knots = r.read_f64_vec()?;
    let weights = if r.read_u8()? == 1 {
        Some(r.read_f64_vec()?)
    } else {
        None
    };
    let coords = r.read_f64_vec()?;
    if coords.len() != n * 3 {
        return Err(ArchiveError::Malformed(format!(
            "curve coordinate count {} does not match {n} points",
            coords.len()
        )));
    }
    let points: Vec<Point3> = coords
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect();
    if degree < 1 || !validate_knots(&knots, points.len(), degree) {
        return Err(ArchiveError::Malformed(
            "curve knot vector does not match control points".into(),
        ));
    }
    if let Some(weights) = &weights {
        if weights.len() != points.len() {
            return Err(ArchiveError::Malformed(
                "curve weight count does not match control points".into(),
            ));
        }
    }
    Ok(NurbsCurve::new(degree, points, weights, knots))
}

fn encode_edge(w: &mut ByteWriter, edge: &Edge) {
    w.write_tag(TAG_CURV);
    for v in [
        edge.start.x, edge.start.y, edge.start.z, edge.end.x, edge.end.y, edge.end.z,
    ] {
        w.write_f64(v);
    }
    w.write_u8(u8::from(edge.forward));
    match &edge.curve {
        Some(curve) => {
            w.write_u8(1);
            encode_curve(w, curve);
        }
        None => w.write_u8(0),
    }
}

fn decode_edge(r: &mut ByteReader) -> Result<Edge, ArchiveError> {
    r.expect_tag(TAG_CURV)?;
    let start = Point3::new(r.read_f64()?, r.read_f64()?, r.read_f64()?);
    let end = Point3::new(r.read_f64()?, r.read_f64()?, r.read_f64()?);
    let forward = r.read_u8()? == 1;
    let curve = if r.read_u8()? == 1 {
        Some(decode_curve(r)?)
    } else {
        None
    };
    Ok(Edge {
        start,
        end,
        curve,
        forward,
    })
}

fn encode_loop(w: &mut ByteWriter, ring: &Loop) {
    w.write_u32(ring.edges.len() as u32);
    for edge in &ring.edges {
        encode_edge(w, edge);
    }
}

fn decode_loop(r: &mut ByteReader) -> Result<Loop, ArchiveError> {
    let count = r.read_u32()? as usize;
    let mut edges = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        edges.push(decode_edge(r)?);
    }
    Ok(Loop::new(edges))
}

fn encode_face(face: &Face) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_tag(TAG_SURF);

    let surface = &face.surface;
    w.write_u32(surface.degree_u as u32);
    w.write_u32(surface.degree_v as u32);
    w.write_u32(surface.nu() as u32);
    w.write_u32(surface.nv() as u32);
    w.write_f64_vec(&surface.knots_u);
    w.write_f64_vec(&surface.knots_v);
    match &surface.weights {
        Some(weights) => {
            w.write_u8(1);
            let flat: Vec<f64> = weights.iter().flatten().copied().collect();
            w.write_f64_vec(&flat);
        }
        None => w.write_u8(0),
    }
    let mut coords = Vec::with_capacity(surface.nu() * surface.nv() * 3);
    for row in &surface.control_points {
        for p in row {
            coords.extend_from_slice(&[p.x, p.y, p.z]);
        }
    }
    w.write_f64_vec(&coords);

    w.write_u8(u8::from(face.same_sense));
    for c in [face.color.r, face.color.g, face.color.b] {
        w.write_f64(c);
    }
    encode_loop(&mut w, &face.outer);
    w.write_u32(face.inner.len() as u32);
    for ring in &face.inner {
        encode_loop(&mut w, ring);
    }
    w.into_vec()
}

fn decode_face(payload: &[u8]) -> Result<Face, ArchiveError> {
    let mut r = ByteReader::new(payload);
    r.expect_tag(TAG_SURF)?;

    let degree_u = r.read_u32()? as usize;
    let degree_v = r.read_u32()? as usize;
    let nu = r.read_u32()? as usize;
    let nv = r.read_u32()? as usize;
    let knots_u = r.read_f64_vec()?;
    let knots_v = r.read_f64_vec()?;
    let weights = if r.read_u8()? == 1 {
        let flat = r.read_f64_vec()?;
        if flat.len() != nu * nv {
            return Err(ArchiveError::Malformed(format!(
                "surface weight count {} does not match {nu}x{nv} net",
                flat.len()
            )));
        }
        Some(
            flat.chunks_exact(nv)
                .map(|row| row.to_vec())
                .collect::<Vec<Vec<f64>>>(),
        )
    } else {
        None
    };
    let coords = r.read_f64_vec()?;
    if coords.len() != nu * nv * 3 {
        return Err(ArchiveError::Malformed(format!(
            "surface coordinate count {} does not match {nu}x{nv} net",
            coords.len()
        )));
    }
    if nu == 0 || nv == 0 || !validate_knots(&knots_u, nu, degree_u) || !validate_knots(&knots_v, nv, degree_v)
    {
        return Err(ArchiveError::Malformed(
            "surface knot vectors do not match control net".into(),
        ));
    }
    let mut grid = Vec::with_capacity(nu);
    for i in 0..nu {
        let mut row = Vec::with_capacity(nv);
        for j in 0..nv {
            let base = (i * nv + j) * 3;
            row.push(Point3::new(coords[base], coords[base + 1], coords[base + 2]));
        }
        grid.push(row);
    }
    let surface = NurbsSurface::new(degree_u, degree_v, grid, weights, knots_u, knots_v);

    let same_sense = r.read_u8()? == 1;
    let color = Color::new(r.read_f64()?, r.read_f64()?, r.read_f64()?);
    let outer = decode_loop(&mut r)?;
    let inner_count = r.read_u32()? as usize;
    let mut inner = Vec::with_capacity(inner_count.min(4096));
    for _ in 0..inner_count {
        inner.push(decode_loop(&mut r)?);
    }

    Ok(Face {
        outer,
        inner,
        surface,
        same_sense,
        color,
    })
}

fn encode_mesh(mesh: &MeshData) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_tag(TAG_MESH);
    w.write_f64_vec(&mesh.positions);
    w.write_f64_vec(&mesh.normals);
    w.write_u32_vec(&mesh.indices);
    w.into_vec()
}

fn decode_mesh(payload: &[u8]) -> Result<MeshData, ArchiveError> {
    let mut r = ByteReader::new(payload);
    r.expect_tag(TAG_MESH)?;
    let positions = r.read_f64_vec()?;
    let normals = r.read_f64_vec()?;
    let indices = r.read_u32_vec()?;
    if positions.len() % 3 != 0 || indices.len() % 3 != 0 {
        return Err(ArchiveError::Malformed(
            "mesh arrays are not multiples of three".into(),
        ));
    }
    if let Some(max) = indices.iter().max() {
        if *max as usize >= positions.len() / 3 {
            return Err(ArchiveError::Malformed(format!(
                "mesh index {max} out of range"
            )));
        }
    }
    Ok(MeshData {
        positions,
        normals,
        indices,
    })
}
