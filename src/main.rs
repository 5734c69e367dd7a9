//! Chitra CLI - render images through small compositing graphs.

use anyhow::{bail, Context, Result};
use chitra::prelude::*;
use log::info;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        return;
    }

    let result = match args[1].as_str() {
        "list" => {
            list_operations();
            Ok(())
        }
        "info" => {
            if args.len() < 3 {
                bail_usage("info <kind>");
                return;
            }
            operation_info(&args[2])
        }
        "render" => {
            if args.len() < 4 {
                bail_usage("render <input> <output> [--op <kind>] [--params <json>] [--tile <n>] [--threads <n>]");
                return;
            }
            render(&args[2..])
        }
        "help" | "--help" | "-h" => {
            print_usage(&args[0]);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage(&args[0]);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("chitra v{} - tile-scheduled node-graph compositing", chitra::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  list                   List registered operation kinds");
    println!("  info <kind>            Show an operation's sockets");
    println!("  render <in> <out>      Render an image through one operation");
    println!("  help                   Show this help message");
    println!();
    println!("Render options:");
    println!("  --op <kind>            Operation kind (default: tonemap)");
    println!("  --params <json>        Parameter record, e.g. '{{\"key\": 0.5}}'");
    println!("  --tile <n>             Tile size (default: {})", DEFAULT_TILE_SIZE);
    println!("  --threads <n>          Worker threads (default: all cores)");
}

fn bail_usage(usage: &str) {
    eprintln!("Usage: chitra {}", usage);
}

fn list_operations() {
    let registry = OperationRegistry::with_builtins();
    println!("Registered operations ({} total):", registry.len());
    for kind in registry.kinds() {
        if let Some(signature) = registry.signature(kind) {
            let sockets: Vec<String> = signature
                .inputs()
                .iter()
                .map(|s| format!("{}:{}", s.name(), s.data_type()))
                .collect();
            println!("  {:24} ({}) -> {}", kind, sockets.join(", "), signature.output());
        }
    }
}

fn operation_info(kind: &str) -> Result<()> {
    let registry = OperationRegistry::with_builtins();
    let signature = registry
        .signature(kind)
        .with_context(|| format!("unknown operation kind '{}'", kind))?;

    println!("Operation: {}", signature.kind());
    println!("Output: {}", signature.output());
    println!("Inputs:");
    for (index, socket) in signature.inputs().iter().enumerate() {
        let driver = if signature.resolution_input() == Some(index) {
            "  (resolution driver)"
        } else {
            ""
        };
        println!(
            "  {}. {} [{}] default {:?}{}",
            index,
            socket.name(),
            socket.data_type(),
            socket.default(),
            driver
        );
    }
    Ok(())
}

fn render(args: &[String]) -> Result<()> {
    let input = &args[0];
    let output = &args[1];

    let mut kind = "tonemap".to_string();
    let mut params = Params::new();
    let mut tile_size = DEFAULT_TILE_SIZE;
    let mut threads = 0usize;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--op" => {
                kind = next_value(args, &mut i)?.to_string();
            }
            "--params" => {
                let json = next_value(args, &mut i)?;
                params = serde_json::from_str(json).context("invalid --params JSON")?;
            }
            "--tile" => {
                tile_size = next_value(args, &mut i)?.parse().context("invalid --tile")?;
            }
            "--threads" => {
                threads = next_value(args, &mut i)?.parse().context("invalid --threads")?;
            }
            other => bail!("unknown option '{}'", other),
        }
        i += 1;
    }

    let registry = OperationRegistry::with_builtins();
    let op = registry.create(&kind, &params)?;

    // Link the source into the operation's first color socket.
    let color_socket = op
        .signature()
        .inputs()
        .iter()
        .position(|s| s.data_type() == DataType::Color)
        .with_context(|| format!("operation '{}' takes no color input", kind))?;

    let image = image::open(input).with_context(|| format!("failed to open {}", input))?;
    info!("loaded {} ({}x{})", input, image.width(), image.height());

    let mut graph = OperationGraph::new();
    let source = graph.add(Box::new(BufferSource::new(PixelBuffer::from_image(&image))));
    let terminal = graph.add(op);
    graph.connect(source, terminal, color_socket)?;

    let ctx = ExecutionContext::new().with_threads(threads).with_progress(|event| {
        if let RenderEvent::TileFinished { finished, total } = event {
            info!("tile {}/{}", finished, total);
        }
    });

    let buffer = TileScheduler::new()
        .with_tile_size(tile_size)
        .execute(&graph, terminal, &ctx)?;

    buffer
        .to_rgba_image()
        .save(output)
        .with_context(|| format!("failed to save {}", output))?;
    info!("wrote {}", output);
    Ok(())
}

fn next_value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(|s| s.as_str())
        .with_context(|| format!("missing value after {}", args[*i - 1]))
}
