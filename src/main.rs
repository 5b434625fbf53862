use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use l4scan::{
    network::interface::list_interfaces, utils::parse_ports, OutputFormat, ReportWriter,
    ScanConfig, ScanEngine, ScanError, UdpSilencePolicy,
};
use std::io::{self, IsTerminal};
use std::process;

fn build_cli() -> Command {
    Command::new("l4scan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Raw-packet TCP SYN and UDP port scanner for IPv4 and IPv6")
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .help("Host name or IP address to scan"),
        )
        .arg(
            Arg::new("interface")
                .short('i')
                .long("interface")
                .value_name("NAME")
                .num_args(0..=1)
                .help("Interface to send from; omit the name to list interfaces"),
        )
        .arg(
            Arg::new("tcp-ports")
                .short('t')
                .long("pt")
                .value_name("PORTS")
                .help("TCP ports to scan (e.g. 22,80-90,443)"),
        )
        .arg(
            Arg::new("udp-ports")
                .short('u')
                .long("pu")
                .value_name("PORTS")
                .help("UDP ports to scan (e.g. 53,161-162)"),
        )
        .arg(
            Arg::new("timeout")
                .short('w')
                .long("wait")
                .value_name("MS")
                .help("Response window per pass in milliseconds [default: 5000]")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .value_name("N")
                .help("Extra passes for unanswered TCP ports [default: 1]")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("warmup")
                .long("warmup")
                .value_name("MS")
                .help("Delay between opening listeners and sending [default: 100]")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("udp-silence")
                .long("udp-silence")
                .value_name("POLICY")
                .help("Verdict for unanswered UDP ports: open or filtered [default: open]")
                .value_parser(clap::builder::PossibleValuesParser::new(["open", "filtered"])),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FORMAT")
                .help("Output format: text or json [default: text]")
                .value_parser(clap::builder::PossibleValuesParser::new(["text", "json"])),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Read settings from a TOML file instead of ~/.l4scan.toml"),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (-v, -vv, -vvv)")
                .action(ArgAction::Count),
        )
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::from_default_env();
    if verbosity > 0 || std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(level);
    }
    builder.init();
}

/// File settings first, then command-line overrides.
fn build_config(matches: &ArgMatches) -> anyhow::Result<ScanConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ScanConfig::from_toml_file(path)?,
        None => ScanConfig::load_default_config(),
    };

    if let Some(target) = matches.get_one::<String>("target") {
        config.target = target.clone();
    }
    if let Some(interface) = matches.get_one::<String>("interface") {
        config.interface = Some(interface.clone());
    }
    if let Some(spec) = matches.get_one::<String>("tcp-ports") {
        config.tcp_ports = parse_ports(spec).context("invalid TCP port list")?;
    }
    if let Some(spec) = matches.get_one::<String>("udp-ports") {
        config.udp_ports = parse_ports(spec).context("invalid UDP port list")?;
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.timeout = *timeout;
    }
    if let Some(retries) = matches.get_one::<u32>("retries") {
        config.retries = *retries;
    }
    if let Some(warmup) = matches.get_one::<u64>("warmup") {
        config.warmup = *warmup;
    }
    if let Some(policy) = matches.get_one::<String>("udp-silence") {
        config.udp_silence = policy.parse::<UdpSilencePolicy>().map_err(anyhow::Error::msg)?;
    }
    if let Some(format) = matches.get_one::<String>("output") {
        config.output = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }

    Ok(config)
}

fn print_interfaces() {
    println!("{}", "Available interfaces:".bright_blue().bold());
    for iface in list_interfaces() {
        println!("  {}", iface);
    }
}

async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = build_config(matches)?;
    if config.interface.is_none() {
        print_interfaces();
        return Ok(());
    }

    let format = config.output;
    let engine = ScanEngine::new(config)?;
    let reports = engine.scan().await?;

    let color = !matches.get_flag("no-color") && io::stdout().is_terminal();
    let writer = ReportWriter::new(format).with_color(color);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for report in &reports {
        writer.write(&mut out, report)?;
    }
    Ok(())
}

fn report_error(error: &anyhow::Error) {
    eprintln!("{} {:#}", "[!]".bright_red().bold(), error);
    if let Some(hint) = error.downcast_ref::<ScanError>().and_then(ScanError::hint) {
        eprintln!("{} {}", "[~]".bright_blue(), hint);
    }
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_count("verbose"));

    let outcome = tokio::select! {
        result = run(&matches) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "[!] Interrupted".bright_yellow());
            process::exit(130);
        }
    };

    if let Err(e) = outcome {
        report_error(&e);
        process::exit(1);
    }
}
