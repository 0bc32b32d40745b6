//! `inspect`: load a tileset document and report its shape and problems.

use clap::Args;
use console::style;
use lodstream::loader::DefaultFetcher;
use lodstream::tileset::{
    load_tileset, validate_arena, AttributeStatistics, LayerDescriptor, StatisticsCache,
    TilesetKind,
};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Tileset document: HTTP(S) URL, file:// URL or local path
    pub tileset: String,

    /// Layer id used in node identities
    #[arg(long, default_value = "layer")]
    pub id: String,

    /// Opaque access token forwarded with the request
    #[arg(long)]
    pub token: Option<String>,

    /// Read the document as 3D Tiles instead of I3S
    #[arg(long)]
    pub tiles3d: bool,

    /// Also fetch and print per-attribute statistics
    #[arg(long)]
    pub stats: bool,
}

pub async fn run(args: InspectArgs) -> Result<(), CliError> {
    let fetcher = DefaultFetcher::new()?;
    let mut descriptor = LayerDescriptor::new(args.id, args.tileset);
    if let Some(token) = args.token {
        descriptor = descriptor.with_token(token);
    }
    if args.tiles3d {
        descriptor.kind = TilesetKind::Tiles3d;
    }

    let (arena, metadata) = load_tileset(&descriptor, &fetcher).await?;

    println!("{}", style(&metadata.url).bold());
    if let Some(name) = &metadata.name {
        println!("  Name:     {}", name);
    }
    if let Some(version) = &metadata.version {
        println!("  Version:  {}", version);
    }
    println!("  Nodes:    {}", metadata.node_count);
    println!("  Content:  {}", metadata.content_count);
    println!("  Depth:    {}", metadata.max_depth);

    if !metadata.statistics.is_empty() {
        println!();
        println!("{}", style("Attribute statistics").bold());
        let cache = StatisticsCache::new();
        for reference in &metadata.statistics {
            if !args.stats {
                println!("  {:<16} {}", reference.attribute, style(&reference.url).dim());
                continue;
            }
            match cache.fetch(reference, descriptor.token.as_deref(), &fetcher).await {
                Ok(stats) => println!("  {:<16} {}", reference.attribute, summarize(&stats)),
                Err(e) => println!("  {:<16} {}", reference.attribute, style(e).red()),
            }
        }
    }

    let problems = validate_arena(&arena);
    println!();
    if problems.is_empty() {
        println!("{}", style("No structural warnings").green());
        return Ok(());
    }

    let total: usize = problems.iter().map(|(_, w)| w.len()).sum();
    println!(
        "{}",
        style(format!("{} warning(s) on {} node(s)", total, problems.len())).yellow()
    );
    for (index, warnings) in &problems {
        let Some(node) = arena.get(*index) else {
            continue;
        };
        for warning in warnings {
            println!("  {}  {}", style(node.id.path()).dim(), warning);
        }
    }
    Ok(())
}

fn summarize(stats: &AttributeStatistics) -> String {
    let field = |name: &str, value: Option<f64>| value.map(|v| format!("{}={}", name, v));
    let parts: Vec<String> = [
        field("min", stats.min),
        field("max", stats.max),
        field("avg", stats.avg),
        field("count", stats.count),
    ]
    .into_iter()
    .flatten()
    .collect();
    if parts.is_empty() {
        "(no numeric statistics)".to_string()
    } else {
        parts.join("  ")
    }
}
