use clap::{Arg, ArgAction, ArgMatches, Command};
use geojson_table::preview::{preview_wkt, Canvas, Preview};
use geojson_table::{
    export_file, load_file, FileStore, JsonFileSink, MemoryStore, Session, SessionStore,
};
use log::LevelFilter;
use std::env;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

fn init_logging() {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if env::var("RUST_LOG").is_err() {
        builder.filter_module("geojson_table", LevelFilter::Info);
    }
    let _ = builder.try_init();
}

fn file_arg() -> Arg {
    Arg::new("file")
        .short('f')
        .long("file")
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
        .help("GeoJSON file (.geojson or .json) holding a FeatureCollection")
}

fn session_arg() -> Arg {
    Arg::new("session")
        .long("session")
        .value_parser(clap::value_parser!(PathBuf))
        .help("Session file keeping column aliases between runs")
}

fn alias_arg() -> Arg {
    Arg::new("alias")
        .short('a')
        .long("alias")
        .action(ArgAction::Append)
        .help("Rename a column, as NAME=ALIAS (repeatable)")
}

fn cli() -> Command {
    Command::new("geojson-table")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Jesper Fjellin")
        .about("Turns GeoJSON features into typed table rows with WKT geometry")
        .subcommand_required(true)
        .subcommand(
            Command::new("inspect")
                .about("Show the inferred columns of a file")
                .arg(file_arg())
                .arg(session_arg())
                .arg(alias_arg()),
        )
        .subcommand(
            Command::new("preview")
                .about("Render the geometry of one row as SVG")
                .arg(file_arg())
                .arg(
                    Arg::new("row")
                        .short('r')
                        .long("row")
                        .required(true)
                        .value_parser(clap::value_parser!(usize))
                        .help("Zero-based row id"),
                )
                .arg(
                    Arg::new("size")
                        .long("size")
                        .value_parser(clap::value_parser!(f64))
                        .help("Canvas width and height in pixels (default 300)"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Write the SVG here instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Write the rows as a table document")
                .arg(file_arg())
                .arg(
                    Arg::new("table")
                        .short('t')
                        .long("table")
                        .required(true)
                        .help("Name of the table to create"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Path of the JSON table document"),
                )
                .arg(session_arg())
                .arg(alias_arg()),
        )
}

fn parse_aliases(matches: &ArgMatches) -> Result<Vec<(String, String)>, Box<dyn Error>> {
    matches
        .get_many::<String>("alias")
        .into_iter()
        .flatten()
        .map(|pair| -> Result<(String, String), Box<dyn Error>> {
            match pair.split_once('=') {
                Some((name, alias)) if !name.is_empty() => {
                    Ok((name.to_string(), alias.to_string()))
                }
                _ => Err(format!("Invalid alias '{}', expected NAME=ALIAS", pair).into()),
            }
        })
        .collect()
}

fn open_store(matches: &ArgMatches) -> Box<dyn SessionStore> {
    match matches.get_one::<PathBuf>("session") {
        Some(path) => Box::new(FileStore::new(path)),
        None => Box::new(MemoryStore::new()),
    }
}

fn required_path<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a PathBuf, Box<dyn Error>> {
    matches
        .get_one::<PathBuf>(id)
        .ok_or_else(|| format!("Missing --{}", id).into())
}

fn run_inspect(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let file = required_path(matches, "file")?;
    let aliases = parse_aliases(matches)?;
    let store = open_store(matches);
    let mut session = Session::new(store.as_ref());
    let ingestion = load_file(&mut session, file, &aliases)?;

    println!("{} features, {} columns", ingestion.rows.len(), ingestion.columns.len());
    for column in &ingestion.columns {
        println!("{}\t{}\t{}", column.name, column.inferred_type, column.alias);
    }
    Ok(())
}

fn run_preview(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let file = required_path(matches, "file")?;
    let row = matches.get_one::<usize>("row").copied().unwrap_or(0);
    let canvas = match matches.get_one::<f64>("size") {
        Some(&size) => Canvas::new(size, Canvas::MODAL.padding),
        None => Canvas::MODAL,
    };

    let store = MemoryStore::new();
    let mut session = Session::new(&store);
    let ingestion = load_file(&mut session, file, &[])?;
    let parsed = ingestion
        .rows
        .get(row)
        .ok_or_else(|| format!("Row {} not found, file has {} rows", row, ingestion.rows.len()))?;

    match preview_wkt(&parsed.wkt, canvas) {
        Preview::Svg(svg) => match matches.get_one::<PathBuf>("output") {
            Some(path) => fs::write(path, svg)?,
            None => println!("{}", svg),
        },
        Preview::Fallback(label) => println!("{}", label),
    }
    Ok(())
}

fn run_export(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let file = required_path(matches, "file")?;
    let output = required_path(matches, "output")?;
    let table = matches
        .get_one::<String>("table")
        .ok_or("Missing --table")?;
    let aliases = parse_aliases(matches)?;
    let store = open_store(matches);
    let mut session = Session::new(store.as_ref());
    let mut sink = JsonFileSink::new(output);

    let summary = export_file(&mut session, file, &aliases, &mut sink, table)?;
    println!(
        "Table '{}' ({}) created with {} records",
        summary.table_name, summary.table_id, summary.records
    );
    Ok(())
}

fn main() {
    init_logging();
    let matches = cli().get_matches();

    let result = match matches.subcommand() {
        Some(("inspect", sub)) => run_inspect(sub),
        Some(("preview", sub)) => run_preview(sub),
        Some(("export", sub)) => run_export(sub),
        _ => Err("Unknown command".into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
