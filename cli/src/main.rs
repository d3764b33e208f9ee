use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use draco_mesh::codec::memory::encode;
use draco_mesh::core::mesh::VertexAttributeDescriptor;
use draco_mesh::decode::layout::ConsistencyWarning;
use draco_mesh::prelude::*;

#[derive(Parser)]
#[command(name = "draco-mesh")]
#[command(about = "Decodes compressed sub-meshes into one vertex and index buffer and prints its layout")]
struct Cli {
    /// Input file paths, one per sub-mesh. `.obj` files are compressed in memory first;
    /// `.drc` files need the `native` feature.
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Decode configuration as a JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Computes missing normals and tangents before printing
    #[arg(long)]
    finish: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Summary {
    vertex_count: usize,
    index_count: usize,
    index_format: IndexFormat,
    layout: Vec<VertexAttributeDescriptor>,
    strides: Vec<usize>,
    sub_meshes: Vec<SubMeshSummary>,
    bounds: Option<[[f32; 3]; 2]>,
    bone_influences: Option<usize>,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct SubMeshSummary {
    topology: MeshTopology,
    base_vertex: usize,
    vertex_count: usize,
    index_start: usize,
    index_count: usize,
    bounds: [[f32; 3]; 2],
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&text).context("Failed to parse config")?
        },
        None => Config::default(),
    };

    let summary = if cli.input.iter().all(|path| extension(path) == "obj") {
        let blocks = cli.input.iter()
            .map(|path| compress_obj(path))
            .collect::<Result<Vec<_>>>()?;
        run(Arc::new(MemoryCodec::new()), blocks, cfg, cli.finish)?
    } else {
        decode_drc(&cli.input, cfg, cli.finish)?
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn extension(path: &Path) -> &str {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
}

#[cfg(feature = "native")]
fn decode_drc(inputs: &[PathBuf], cfg: Config, finish: bool) -> Result<Summary> {
    let blocks = inputs.iter()
        .map(|path| {
            if extension(path) != "drc" {
                anyhow::bail!("Input file must be a .obj or .drc file: {}", path.display());
            }
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    run(Arc::new(NativeCodec), blocks, cfg, finish)
}

#[cfg(not(feature = "native"))]
fn decode_drc(_inputs: &[PathBuf], _cfg: Config, _finish: bool) -> Result<Summary> {
    anyhow::bail!("Decoding .drc files requires the `native` feature; without it every input must be a .obj file")
}

/// Loads an OBJ file and compresses its first model with the in-memory codec.
fn compress_obj(path: &Path) -> Result<Vec<u8>> {
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _) = tobj::load_obj(path, &options)
        .with_context(|| format!("Failed to load OBJ file {}", path.display()))?;
    let model = models.first()
        .with_context(|| format!("{} contains no model", path.display()))?;
    let mesh = &model.mesh;

    let num_vertices = mesh.positions.len() / 3;
    let faces = mesh.indices.chunks_exact(3).map(|f| [f[0], f[1], f[2]]).collect();
    let mut source = SourceMesh::triangles(num_vertices, faces)
        .with_attribute(SourceAttribute::from_f32(AttributeType::Position, 3, 0, &mesh.positions));
    if mesh.normals.len() == mesh.positions.len() {
        source = source.with_attribute(SourceAttribute::from_f32(AttributeType::Normal, 3, 1, &mesh.normals));
    }
    if mesh.texcoords.len() == num_vertices * 2 {
        source = source.with_attribute(SourceAttribute::from_f32(AttributeType::TextureCoordinate, 2, 2, &mesh.texcoords));
    }
    Ok(encode(&source))
}

fn run<C: Codec>(codec: Arc<C>, blocks: Vec<Vec<u8>>, cfg: Config, finish: bool) -> Result<Summary> {
    let result = decode_blocking(codec, blocks, cfg).context("Failed to decode")?;
    let bone_influences = result.bone_weights.as_ref().map(|b| b.get_influences());
    let warnings: Vec<String> = result.warnings.iter().map(ConsistencyWarning::to_string).collect();
    let bounds = result.bounds;
    let mesh = if finish {
        result.into_mesh().context("Failed to finish the mesh")?
    } else {
        result.mesh
    };

    let to_array = |b: Aabb| [b.min.to_array(), b.max.to_array()];
    Ok(Summary {
        vertex_count: mesh.get_vertex_count(),
        index_count: mesh.get_indices().len(),
        index_format: mesh.get_indices().format(),
        layout: mesh.get_layout().to_vec(),
        strides: (0..mesh.get_stream_count()).map(|s| mesh.get_stride(s)).collect(),
        sub_meshes: mesh.get_sub_meshes().iter()
            .map(|s| SubMeshSummary {
                topology: s.topology,
                base_vertex: s.base_vertex,
                vertex_count: s.vertex_count,
                index_start: s.index_start,
                index_count: s.index_count,
                bounds: to_array(s.bounds),
            })
            .collect(),
        bounds: bounds.map(to_array),
        bone_influences,
        warnings,
    })
}

fn print_summary(summary: &Summary) {
    println!("vertices: {}, indices: {} ({:?})", summary.vertex_count, summary.index_count, summary.index_format);
    for (stream, stride) in summary.strides.iter().enumerate() {
        println!("stream {} (stride {})", stream, stride);
        for desc in summary.layout.iter().filter(|d| d.stream == stream) {
            println!("  {:>4}  {:?} {:?}x{}", desc.offset, desc.attribute, desc.format, desc.dimension);
        }
    }
    for (i, s) in summary.sub_meshes.iter().enumerate() {
        println!(
            "sub-mesh {}: {:?}, vertices {}..{}, indices {}..{}",
            i, s.topology, s.base_vertex, s.base_vertex + s.vertex_count, s.index_start, s.index_start + s.index_count
        );
    }
    if let Some([min, max]) = summary.bounds {
        println!("bounds: {:?} .. {:?}", min, max);
    }
    if let Some(influences) = summary.bone_influences {
        println!("bone influences: {}", influences);
    }
    for warning in &summary.warnings {
        println!("warning: {}", warning);
    }
}
