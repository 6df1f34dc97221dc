//! Argument surface: generic flags plus one subcommand per loaded protocol
//!
//! Protocol subcommands are assembled at runtime because each protocol may
//! contribute its own arguments. Contributed values are collected raw into
//! `RunArgs::extra`.

use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use nexec_core::{ProtocolHandle, ProtocolLoader};
use nexec_foundation::{expand_cred_ids, NexecConfig, RunArgs};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CODENAME: &str = "Knock Knock";

/// Generic argument ids, shared by every subcommand
const GENERIC_IDS: &[&str] = &[
    "threads",
    "timeout",
    "jitter",
    "no_progress",
    "log",
    "verbose",
    "debug",
    "force_ipv6",
    "dns_server",
    "dns_tcp",
    "dns_timeout",
];

/// Argument ids every protocol subcommand carries
const PROTOCOL_IDS: &[&str] = &[
    "target",
    "module",
    "module_options",
    "list_modules",
    "show_module_options",
    "kerberos",
    "use_kcache",
    "aes_key",
    "kdc_host",
    "obfs",
    "clear_obfscripts",
    "cred_id",
    "results",
];

/// What the user asked for
#[derive(Debug)]
pub struct Invocation {
    pub args: RunArgs,
    /// Print stored results instead of running
    pub show_results: bool,
}

pub fn build_command(
    config: &NexecConfig,
    protocols: &[ProtocolHandle],
    loader: &ProtocolLoader,
) -> Command {
    let mut command = Command::new("nexec")
        .about("Run protocol checks and extension modules across many hosts")
        .version(VERSION)
        .long_version(format!("{} - {}", VERSION, CODENAME))
        .subcommand_value_name("PROTOCOL")
        .subcommand_help_heading("Available Protocols")
        .args(generic_args(config));

    for handle in protocols {
        let base = protocol_command(handle.name());
        command = command.subcommand(loader.contribute_args(handle, base));
    }
    command
}

fn generic_args(config: &NexecConfig) -> Vec<Arg> {
    vec![
        Arg::new("threads")
            .short('t')
            .long("threads")
            .value_name("THREADS")
            .value_parser(value_parser!(usize))
            .default_value(config.threads.to_string())
            .global(true)
            .help("Maximum number of concurrent targets"),
        Arg::new("timeout")
            .long("timeout")
            .value_name("SECONDS")
            .value_parser(value_parser!(u64))
            .global(true)
            .help("Max timeout in seconds of each target"),
        Arg::new("jitter")
            .long("jitter")
            .value_name("INTERVAL")
            .global(true)
            .help("Random delay between each authentication"),
        Arg::new("no_progress")
            .long("no-progress")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Do not display the progress bar"),
        Arg::new("log")
            .long("log")
            .value_name("FILE")
            .global(true)
            .help("Also write log output to FILE"),
        Arg::new("verbose")
            .long("verbose")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Enable verbose output"),
        Arg::new("debug")
            .long("debug")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Enable debug level information"),
        Arg::new("force_ipv6")
            .short('6')
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Enable force IPv6"),
        Arg::new("dns_server")
            .long("dns-server")
            .value_name("SERVER")
            .global(true)
            .help("Specify DNS server"),
        Arg::new("dns_tcp")
            .long("dns-tcp")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Use TCP instead of UDP for DNS queries"),
        Arg::new("dns_timeout")
            .long("dns-timeout")
            .value_name("SECONDS")
            .value_parser(value_parser!(u64))
            .default_value("3")
            .global(true)
            .help("DNS query timeout in seconds"),
    ]
}

fn protocol_command(name: &str) -> Command {
    Command::new(name.to_string())
        .about(format!("own stuff using {}", name.to_uppercase()))
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .num_args(0..)
                .action(ArgAction::Append)
                .help("IP(s), range(s), CIDR(s), hostname(s), or file(s) of targets, nmap XML or .nessus"),
        )
        .next_help_heading("Modules")
        .arg(
            Arg::new("module")
                .short('M')
                .long("module")
                .value_name("MODULE")
                .action(ArgAction::Append)
                .help("Module to use"),
        )
        .arg(
            Arg::new("module_options")
                .short('o')
                .value_name("KEY=VALUE")
                .num_args(1..)
                .action(ArgAction::Append)
                .help("Module options"),
        )
        .arg(
            Arg::new("list_modules")
                .short('L')
                .long("list-modules")
                .action(ArgAction::SetTrue)
                .help("List available modules"),
        )
        .arg(
            Arg::new("show_module_options")
                .long("options")
                .action(ArgAction::SetTrue)
                .help("Display module options"),
        )
        .next_help_heading("Kerberos")
        .arg(
            Arg::new("kerberos")
                .short('k')
                .long("kerberos")
                .action(ArgAction::SetTrue)
                .help("Use Kerberos authentication"),
        )
        .arg(
            Arg::new("use_kcache")
                .long("use-kcache")
                .action(ArgAction::SetTrue)
                .help("Use Kerberos authentication from ccache file (KRB5CCNAME)"),
        )
        .arg(
            Arg::new("aes_key")
                .long("aes-key")
                .value_name("AESKEY")
                .num_args(1..)
                .action(ArgAction::Append)
                .help("AES key to use for Kerberos Authentication (128 or 256 bits)"),
        )
        .arg(
            Arg::new("kdc_host")
                .long("kdc-host")
                .value_name("KDCHOST")
                .help("FQDN of the domain controller"),
        )
        .next_help_heading("Other")
        .arg(
            Arg::new("obfs")
                .long("obfs")
                .action(ArgAction::SetTrue)
                .help("Obfuscate PowerShell scripts"),
        )
        .arg(
            Arg::new("clear_obfscripts")
                .long("clear-obfscripts")
                .action(ArgAction::SetTrue)
                .help("Clear all cached obfuscated PowerShell scripts"),
        )
        .arg(
            Arg::new("cred_id")
                .long("cred-id")
                .value_name("CRED_ID")
                .num_args(1..)
                .action(ArgAction::Append)
                .help("Database credential ID(s) to use for authentication, ranges as a-b"),
        )
        .arg(
            Arg::new("results")
                .long("results")
                .action(ArgAction::SetTrue)
                .help("Show what this protocol recorded in the current workspace"),
        )
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Turn parsed matches into run arguments.
pub fn parse_invocation(matches: &ArgMatches, config: &NexecConfig) -> Result<Invocation> {
    let mut args = RunArgs::default();

    // Generic args are global, so the subcommand's matches carry them too
    let (protocol, m) = match matches.subcommand() {
        Some((name, sub)) => (Some(name.to_string()), sub),
        None => (None, matches),
    };

    args.threads = m.get_one::<usize>("threads").copied().unwrap_or(config.threads);
    args.timeout = m.get_one::<u64>("timeout").copied().or(config.timeout);
    args.jitter = m.get_one::<String>("jitter").cloned();
    args.no_progress = m.get_flag("no_progress");
    args.log = m.get_one::<String>("log").cloned();
    args.verbose = m.get_flag("verbose");
    args.debug = m.get_flag("debug");
    args.force_ipv6 = m.get_flag("force_ipv6");
    args.dns_server = m.get_one::<String>("dns_server").cloned();
    args.dns_tcp = m.get_flag("dns_tcp");
    args.dns_timeout = m.get_one::<u64>("dns_timeout").copied().unwrap_or(3);

    let mut show_results = false;
    if protocol.is_some() {
        args.targets = strings(m, "target");
        args.modules = strings(m, "module");
        args.module_options = strings(m, "module_options");
        args.list_modules = m.get_flag("list_modules");
        args.show_module_options = m.get_flag("show_module_options");
        args.kerberos = m.get_flag("kerberos");
        args.use_kcache = m.get_flag("use_kcache");
        args.aes_key = strings(m, "aes_key");
        args.kdc_host = m.get_one::<String>("kdc_host").cloned();
        args.obfs = m.get_flag("obfs");
        args.clear_obfscripts = m.get_flag("clear_obfscripts");
        args.cred_id = expand_cred_ids(&strings(m, "cred_id"))?;
        show_results = m.get_flag("results");

        for id in m.ids() {
            let id = id.as_str();
            if GENERIC_IDS.contains(&id) || PROTOCOL_IDS.contains(&id) {
                continue;
            }
            if let Ok(Some(raw)) = m.try_get_raw(id) {
                let values = raw.map(|v| v.to_string_lossy().into_owned()).collect();
                args.extra.insert(id.to_string(), values);
            }
        }
    }
    args.protocol = protocol;

    Ok(Invocation { args, show_results })
}
