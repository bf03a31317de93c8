use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use node_atlas::{
    AtlasBuilder, AtlasConfig, BuildOutcome, GridLayout, NodeAtlasSpec, NodeId, NodeTable,
    SnapshotGate, TextureIndex,
};

#[derive(Parser, Debug)]
#[command(name = "node-atlas", version)]
struct Cli {
    /// More log output (repeat for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build node atlases (requires the external raster tools on PATH).
    Build(BuildArgs),
    /// Print where texture names resolve to.
    Resolve(ResolveArgs),
    /// Print the grid layout of a node without building it.
    Plan(PlanArgs),
}

#[derive(Parser, Debug)]
struct BuildArgs {
    /// Exported node table JSON, keyed by `<mod>:<node>`.
    #[arg(long)]
    nodes: PathBuf,

    /// Atlas config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only build these nodes (`<mod>:<node>`); defaults to every node.
    #[arg(long = "node")]
    only: Vec<String>,

    /// Ignore change-gate snapshots and rebuild.
    #[arg(long)]
    force: bool,

    /// Copy combined animations into the configured `dist_dir`.
    #[arg(long)]
    publish: bool,
}

#[derive(Parser, Debug)]
struct ResolveArgs {
    /// Atlas config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Texture names (modifiers after `^` are ignored).
    #[arg(required = true)]
    textures: Vec<String>,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Exported node table JSON, keyed by `<mod>:<node>`.
    #[arg(long)]
    nodes: PathBuf,

    /// Node to plan (`<mod>:<node>`).
    node: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match cli.cmd {
        Command::Build(args) => cmd_build(args),
        Command::Resolve(args) => cmd_resolve(args),
        Command::Plan(args) => cmd_plan(args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::WARN,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AtlasConfig> {
    let cfg = match path {
        Some(path) => AtlasConfig::from_json_file(path)?,
        None => AtlasConfig::default(),
    };
    let cfg = cfg.with_env();
    cfg.validate()?;
    Ok(cfg)
}

fn read_nodes_json(path: &Path) -> anyhow::Result<NodeTable> {
    let f = File::open(path).with_context(|| format!("open node table '{}'", path.display()))?;
    let nodes: NodeTable = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse node table '{}'", path.display()))?;
    Ok(nodes)
}

fn cmd_build(args: BuildArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let dist_dir = match (args.publish, &cfg.dist_dir) {
        (true, Some(dir)) => Some(dir.clone()),
        (true, None) => anyhow::bail!("--publish requires `dist_dir` in the config"),
        (false, _) => None,
    };

    for program in cfg.tools.programs() {
        if !node_atlas::tool_available(program) {
            anyhow::bail!("required tool '{program}' was not found on PATH");
        }
    }

    let nodes = read_nodes_json(&args.nodes)?;
    let selected: Vec<String> = if args.only.is_empty() {
        nodes.keys().cloned().collect()
    } else {
        let mut only = args.only.clone();
        only.sort();
        only.dedup();
        only
    };

    let builder = AtlasBuilder::new(cfg)?;
    let (mut built, mut up_to_date, mut no_tiles) = (0usize, 0usize, 0usize);
    for key in &selected {
        let data = nodes
            .get(key)
            .with_context(|| format!("node '{key}' is not in the node table"))?;
        let node: NodeId = key.parse()?;
        let Some(spec) = NodeAtlasSpec::from_node_data(data)
            .with_context(|| format!("node '{key}'"))?
        else {
            no_tiles += 1;
            continue;
        };

        if args.force {
            SnapshotGate::invalidate(&builder.config().state_dir, &node)?;
        }

        match builder
            .build_node(&node, &spec)
            .with_context(|| format!("build atlas for '{node}'"))?
        {
            BuildOutcome::Built(report) => {
                built += 1;
                eprintln!(
                    "built {node}: {} frame(s), {} scale(s), {} warning(s)",
                    report.frame_count,
                    report.artifacts.len(),
                    report.warnings.len()
                );
            }
            BuildOutcome::UpToDate => up_to_date += 1,
            BuildOutcome::NoTiles => no_tiles += 1,
        }

        if let Some(dist_dir) = &dist_dir {
            let published = builder.publish_node(&node, &spec, dist_dir)?;
            for warning in &published.warnings {
                eprintln!("WARN: {node}: {warning}");
            }
        }
    }

    eprintln!("done: {built} built, {up_to_date} up to date, {no_tiles} without tiles");
    Ok(())
}

fn cmd_resolve(args: ResolveArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let index = TextureIndex::scan(&cfg.content_roots, &cfg.texture_glob)?;

    let mut missing = 0usize;
    for texture in &args.textures {
        let name = texture.split('^').next().unwrap_or(texture);
        match index.resolve(name) {
            Some(path) => println!("{name}\t{}", path.display()),
            None => {
                missing += 1;
                println!("{name}\t<missing>");
            }
        }
    }
    if missing > 0 {
        anyhow::bail!("{missing} texture(s) could not be resolved");
    }
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let nodes = read_nodes_json(&args.nodes)?;
    let node: NodeId = args.node.parse()?;
    let data = nodes
        .get(&node.to_string())
        .with_context(|| format!("node '{node}' is not in the node table"))?;
    let Some(spec) = NodeAtlasSpec::from_node_data(data)? else {
        println!("{node}: no tiles");
        return Ok(());
    };

    let layout = GridLayout::for_tile_count(spec.tiles.len());
    let scales = node_atlas::scale::kept_scales(layout.canvas_height());
    println!("node:        {node}");
    println!("mode:        {}", spec.render_mode);
    println!("tiles:       {}", spec.tiles.len());
    println!("special:     {}", spec.special_tiles.len());
    println!("grid_dim:    {}", layout.grid_dim);
    println!(
        "canvas:      {}x{}",
        layout.canvas_width(),
        layout.canvas_height()
    );
    println!(
        "scales:      {}",
        scales
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    );
    Ok(())
}
