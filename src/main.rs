//! resgraph CLI - validate resource configurations and inspect their graphs.

use anyhow::{bail, Context, Result};
use resgraph::prelude::*;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("resgraph");

    if args.len() < 2 {
        print_usage(program);
        return ExitCode::FAILURE;
    }

    let result = match args[1].as_str() {
        "validate" => validate(&args[2..]),
        "graph" => graph(&args[2..]),
        "help" | "--help" | "-h" => {
            print_usage(program);
            Ok(true)
        }
        "version" | "--version" | "-V" => {
            println!("{} v{}", resgraph::NAME, resgraph::VERSION);
            Ok(true)
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage(program);
            Ok(false)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}

fn print_usage(program: &str) {
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  validate <paths...> [options]  Validate every resource and instance");
    println!("  graph <paths...> [--expand ADDR]  Print a graph as JSON");
    println!("  version                        Show the version");
    println!("  help                           Show this help message");
    println!();
    println!("Paths may be .json or .toml files, directories or glob patterns.");
    println!();
    println!("Validate options:");
    println!("  --target <ADDR>   Restrict the walk to a resource or instance (repeatable)");
    println!("  --sequential      Walk resources one at a time");
    println!("  --threads <N>     Worker threads for parallel walks (default: all cores)");
    println!("  --fail-fast       Stop after the first batch with errors");
    println!();
    println!("Graph options:");
    println!("  --expand <ADDR>   Print the instance graph of one resource instead");
    println!();
    println!("Set RUST_LOG=debug for walk details.");
}

/// Command-line options shared by the subcommands.
#[derive(Debug, Default)]
struct Options {
    paths: Vec<String>,
    targets: Vec<Target>,
    sequential: bool,
    threads: usize,
    fail_fast: bool,
    expand: Option<ResourceAddress>,
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--target" => {
                let value = iter.next().context("--target requires an address")?;
                let target: Target = value
                    .parse()
                    .with_context(|| format!("invalid target '{}'", value))?;
                options.targets.push(target);
            }
            "--threads" => {
                let value = iter.next().context("--threads requires a number")?;
                options.threads = value
                    .parse()
                    .with_context(|| format!("invalid thread count '{}'", value))?;
            }
            "--expand" => {
                let value = iter.next().context("--expand requires an address")?;
                let addr: ResourceAddress = value
                    .parse()
                    .with_context(|| format!("invalid resource address '{}'", value))?;
                options.expand = Some(addr);
            }
            "--sequential" => options.sequential = true,
            "--fail-fast" => options.fail_fast = true,
            flag if flag.starts_with("--") => bail!("unknown option '{}'", flag),
            path => options.paths.push(path.to_string()),
        }
    }
    if options.paths.is_empty() {
        bail!("no workspace paths given");
    }
    Ok(options)
}

fn validate(args: &[String]) -> Result<bool> {
    let options = parse_options(args)?;
    let workspace = Workspace::load(&options.paths[..])?;

    let walk_options = WalkOptions::new()
        .with_parallel(!options.sequential)
        .with_max_threads(options.threads)
        .with_targets(options.targets)
        .with_fail_fast(options.fail_fast)
        .with_progress(|event| {
            if let WalkEvent::ResourceExpanded { address, instances } = event {
                log::info!("{} expanded to {} instance(s)", address, instances);
            }
        });

    let report = Walker::new(workspace.context())
        .with_options(walk_options)
        .validate(&workspace.resources);

    for line in report.diagnostics.detailed() {
        println!("{}", line);
    }
    if !report.diagnostics.is_empty() {
        println!();
    }
    println!(
        "{} resource(s), {} instance(s) validated in {:.2?}",
        report.stats.resources_walked,
        report.stats.instances_validated,
        report.stats.total_duration
    );
    if report.stats.resources_skipped > 0 {
        println!("{} resource(s) skipped", report.stats.resources_skipped);
    }
    let cache = workspace.providers().cache_stats();
    if cache.hits + cache.misses > 0 {
        println!("Provider schema cache: {}", cache);
    }
    println!("{}", report.diagnostics.summary());

    Ok(report.is_success())
}

fn graph(args: &[String]) -> Result<bool> {
    let options = parse_options(args)?;
    let workspace = Workspace::load(&options.paths[..])?;
    let walker = Walker::new(workspace.context());

    let graph = match &options.expand {
        None => {
            let (graph, diags) = walker.declaration_graph(&workspace.resources);
            if diags.has_errors() {
                for line in diags.detailed() {
                    eprintln!("{}", line);
                }
                return Ok(false);
            }
            graph
        }
        Some(addr) => {
            let Some(config) = workspace.resources.iter().find(|c| c.address() == *addr) else {
                bail!("no resource {} in workspace", addr);
            };
            let mut node = ResourceNode::new(Arc::clone(config));
            node.validation_sequence(walker.context()).run();
            match node.dynamic_expand(walker.context()) {
                Ok(graph) => graph,
                Err(error) => {
                    for line in error.diagnostics().detailed() {
                        eprintln!("{}", line);
                    }
                    return Ok(false);
                }
            }
        }
    };

    println!("{}", SerializedGraph::from(&graph).to_json()?);
    Ok(true)
}
