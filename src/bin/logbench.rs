use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use logbench::compare::{AlignmentMethod, ComparisonEngine};
use logbench::config::Config;
use logbench::state::MAX_CHART_POINTS;
use logbench::parsers::{LogParser, LogRecord};
use logbench::tune::{self, TuneFormat, TuneRecord};

const USAGE: &str = "\
usage: logbench [--config FILE] <command> ...

commands:
  detect FILE...                     print the detected log format of each file
  parse FILE                         parse a log and print a summary
  compare [options] FILE...          load logs into one session and query them
      --align METHOD                 time-zero | event-start | peak-value
      --channel NAME                 channel for event-start / peak-value
      --target VALUE                 target value for event-start
      --cursor SECONDS               print values at this aligned time
      --range START END              print min/max/avg over this aligned range
      --math NAME=FORMULA            add a math channel (repeatable)
      --series [POINTS]              print --channel per log, downsampled
  tune INPUT [OUTPUT.csv]            import a tune; convert it when OUTPUT is given

Set RUST_LOG (e.g. RUST_LOG=debug) to control log output.";

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(env::args().skip(1).collect()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(mut args: Vec<String>) -> Result<()> {
    let config = match args.iter().position(|a| a == "--config") {
        Some(pos) => {
            let path = args
                .get(pos + 1)
                .cloned()
                .ok_or_else(|| anyhow!("--config needs a file"))?;
            args.drain(pos..=pos + 1);
            Config::from_file(&path).with_context(|| format!("Failed to load config {}", path))?
        }
        None => Config::default(),
    };

    let Some(command) = args.first().cloned() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    match command.as_str() {
        "detect" => detect(&config, rest),
        "parse" => parse(&config, rest),
        "compare" => compare(&config, rest),
        "tune" => tune_command(&config, rest),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn detect(config: &Config, files: &[String]) -> Result<()> {
    if files.is_empty() {
        bail!("detect needs at least one file");
    }
    let parser = LogParser::new(config.engine.parse.clone());
    for file in files {
        let format = parser
            .detect(Path::new(file))
            .with_context(|| format!("Failed to read {}", file))?;
        println!("{}: {}", file, format);
    }
    Ok(())
}

fn parse(config: &Config, args: &[String]) -> Result<()> {
    let [file] = args else {
        bail!("parse needs exactly one file");
    };
    let parser = LogParser::new(config.engine.parse.clone());
    let log = parser
        .parse(Path::new(file), None)
        .with_context(|| format!("Failed to parse {}", file))?;
    print_summary(file, &log);
    Ok(())
}

fn print_summary(file: &str, log: &LogRecord) {
    let meta = log.meta();
    println!("\n=== Parse Results: {} ===", file);
    println!("Format: {}", meta.format);
    if let Some(vehicle) = &meta.vehicle {
        let year = vehicle.year.map(|y| y.to_string()).unwrap_or_default();
        let make = vehicle.make.as_deref().unwrap_or("");
        let model = vehicle.model.as_deref().unwrap_or("");
        println!("Vehicle: {} {} {}", year, make, model);
    }
    println!("Channels: {}", log.channel_names().len());
    println!("Data points: {}", log.len());
    println!(
        "Time range: {:.3} to {:.3} seconds",
        log.time().first().copied().unwrap_or(0.0),
        log.time().last().copied().unwrap_or(0.0)
    );
    if let Some(rate) = meta.sample_rate {
        println!("Sample rate: {:.2} Hz", rate);
    }
    for (key, value) in &meta.properties {
        println!("  {}: {}", key, value);
    }

    println!("\n=== First 15 Channels (with units) ===");
    for (i, name) in log.channel_names().iter().take(15).enumerate() {
        let unit = log.unit(name).map(|u| format!(" [{}]", u)).unwrap_or_default();
        let missing = log
            .channel(name)
            .map(|values| values.iter().filter(|v| v.is_none()).count())
            .unwrap_or(0);
        println!("  {:2}. {}{} ({} missing)", i + 1, name, unit, missing);
    }
    if log.channel_names().len() > 15 {
        println!("  ... and {} more channels", log.channel_names().len() - 15);
    }
}

/// Options accepted by the `compare` command
#[derive(Default)]
struct CompareArgs {
    files: Vec<PathBuf>,
    align: Option<AlignmentMethod>,
    channel: Option<String>,
    target: Option<f64>,
    cursor: Option<f64>,
    range: Option<(f64, f64)>,
    math: Vec<(String, String)>,
    series: Option<usize>,
}

impl CompareArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = CompareArgs::default();
        let mut iter = args.iter();
        let number = |flag: &str, value: Option<&String>| -> Result<f64> {
            value
                .ok_or_else(|| anyhow!("{} needs a value", flag))?
                .parse()
                .with_context(|| format!("{} needs a number", flag))
        };

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--align" => {
                    let method = iter.next().ok_or_else(|| anyhow!("--align needs a method"))?;
                    parsed.align = Some(
                        method
                            .parse()
                            .map_err(|_| anyhow!("unknown alignment method '{}'", method))?,
                    );
                }
                "--channel" => {
                    parsed.channel = Some(
                        iter.next()
                            .cloned()
                            .ok_or_else(|| anyhow!("--channel needs a name"))?,
                    );
                }
                "--target" => parsed.target = Some(number("--target", iter.next())?),
                "--cursor" => parsed.cursor = Some(number("--cursor", iter.next())?),
                "--range" => {
                    let start = number("--range", iter.next())?;
                    let end = number("--range", iter.next())?;
                    parsed.range = Some((start, end));
                }
                "--math" => {
                    let spec = iter.next().ok_or_else(|| anyhow!("--math needs NAME=FORMULA"))?;
                    let (name, formula) = spec
                        .split_once('=')
                        .ok_or_else(|| anyhow!("--math needs NAME=FORMULA, got '{}'", spec))?;
                    parsed.math.push((name.trim().to_string(), formula.to_string()));
                }
                "--series" => {
                    let points = match iter.clone().next().map(|p| p.parse::<usize>()) {
                        Some(Ok(points)) => {
                            iter.next();
                            points
                        }
                        _ => MAX_CHART_POINTS,
                    };
                    parsed.series = Some(points);
                }
                flag if flag.starts_with("--") => bail!("unknown option '{}'", flag),
                file => parsed.files.push(PathBuf::from(file)),
            }
        }

        if parsed.files.is_empty() {
            bail!("compare needs at least one file");
        }
        Ok(parsed)
    }
}

fn compare(config: &Config, args: &[String]) -> Result<()> {
    let args = CompareArgs::parse(args)?;
    let mut engine = ComparisonEngine::new(config.engine.clone());

    for file in &args.files {
        engine
            .load(file, None, None)
            .with_context(|| format!("Failed to load {}", file.display()))?;
    }
    for (name, formula) in &args.math {
        engine.add_math_channel(name, formula)?;
    }
    if let Some(method) = args.align {
        engine.align(method, args.channel.as_deref(), args.target)?;
    }

    println!("\n=== Session ===");
    for log in engine.logs() {
        println!(
            "  {} [{}] offset {:+.3}s, {} channels, {} samples",
            log.name,
            log.record.format(),
            log.offset,
            log.record.channel_names().len(),
            log.record.len()
        );
    }
    if let Some((start, end)) = engine.time_range() {
        println!("Aligned time range: {:.3} to {:.3} seconds", start, end);
    }

    if let Some(position) = args.cursor {
        engine.set_cursor(position, args.channel.as_deref());
        let result = engine.cursor_query();
        println!("\n=== Cursor @ {:.3}s ===", result.position);
        for (log, values) in &result.values {
            println!("  {}", log);
            for (channel, value) in values {
                let diff = result
                    .differences
                    .get(log)
                    .and_then(|d| d.get(channel))
                    .map(|d| format!(" ({:+.3} vs baseline)", d))
                    .unwrap_or_default();
                match value {
                    Some(v) => println!("    {}: {:.3}{}", channel, v, diff),
                    None => println!("    {}: -", channel),
                }
            }
        }
    }

    if let Some(points) = args.series {
        let channel = args
            .channel
            .as_deref()
            .ok_or_else(|| anyhow!("--series needs --channel"))?;
        let (start, end) = args.range.unzip();
        let series = engine.downsampled_samples(channel, start, end, points);
        println!("\n=== {} (at most {} points per log) ===", channel, points);
        for (log, points) in &series {
            println!("  {} ({} points)", log, points.len());
            for [t, v] in points {
                println!("    {:.3}\t{:.3}", t, v);
            }
        }
    }

    if let Some((start, end)) = args.range {
        let channels: Vec<&str> = args.channel.iter().map(String::as_str).collect();
        let filter = (!channels.is_empty()).then_some(channels.as_slice());
        let stats = engine.analyze_range(start, end, filter);
        println!("\n=== Range {:.3}s to {:.3}s ===", start, end);
        for (log, channels) in &stats {
            println!("  {}", log);
            for (channel, s) in channels {
                println!(
                    "    {}: min {:.3}  max {:.3}  avg {:.3}  ({} samples)",
                    channel, s.min, s.max, s.avg, s.count
                );
            }
        }
    }
    Ok(())
}

fn tune_command(config: &Config, args: &[String]) -> Result<()> {
    let (input, output) = match args {
        [input] => (Path::new(input), None),
        [input, output] => (Path::new(input), Some(Path::new(output))),
        _ => bail!("tune needs INPUT [OUTPUT.csv]"),
    };

    let record = tune::import_tune_with(input, &config.tune)
        .with_context(|| format!("Failed to import {}", input.display()))?;
    print_tune(input, &record);

    if let Some(output) = output {
        tune::export_tune(&record, output, TuneFormat::Csv)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("\nWrote {}", output.display());
    }
    Ok(())
}

fn print_tune(input: &Path, record: &TuneRecord) {
    println!("\n=== Tune: {} ===", input.display());
    println!("Format: {}", record.source_format);
    println!("Make: {}", record.make);
    println!("Model: {}", record.model);
    println!("Year: {}", record.year);
    if let Some(vin) = &record.vin {
        println!("VIN: {}", vin);
    }
    println!("Parameters: {}", record.parameter_count());
}
