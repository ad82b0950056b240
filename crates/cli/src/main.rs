use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use putwire_config::{SystemManifest, TestAssertion, TestScript};
use putwire_core::metrics::OutputMetrics;
use putwire_core::Machine;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "Putwire console simulator", long_about = None)]
struct Cli {
    /// Enable debug-level tracing of every sink event
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write lines through the console driver into a simulated sink
    Run(RunArgs),
    /// Run a YAML test script and check its assertions
    Test(TestArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Line to write with `puts` (repeatable)
    #[arg(long = "text", required = true)]
    text: Vec<String>,

    /// Path to the system manifest (YAML)
    #[arg(short, long)]
    system: Option<PathBuf>,

    /// Peripheral ticks to run after each line
    #[arg(long, default_value = "0")]
    ticks: u64,

    /// Write a JSON machine snapshot here when done
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Do not mirror sink output to stdout
    #[arg(long)]
    no_echo: bool,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(long)]
    script: PathBuf,

    /// Directory to write result.json into
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Do not mirror sink output to stdout
    #[arg(long)]
    no_echo: bool,
}

#[derive(Debug, Serialize)]
struct AssertionResult {
    assertion: TestAssertion,
    passed: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct TestResult {
    status: &'static str,
    script: String,
    output: String,
    output_sha256: String,
    writes: u64,
    lost: u64,
    register: i32,
    assertions: Vec<AssertionResult>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only sink output
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => ExitCode::from(run(args)),
        Command::Test(args) => ExitCode::from(test(args)),
    }
}

fn build_machine(system: Option<&Path>, no_echo: bool) -> anyhow::Result<Machine> {
    let machine = if let Some(sys_path) = system {
        info!("Loading system manifest: {:?}", sys_path);
        let manifest = SystemManifest::from_file(sys_path)?;
        Machine::from_manifest(&manifest)?
    } else {
        info!("Using default hardware configuration");
        Machine::new()
    };

    if no_echo {
        machine.with_sink_mut(|sink| sink.set_echo(false))?;
    }
    Ok(machine)
}

fn write_lines(machine: &Machine, lines: &[String], ticks_per_line: u64) -> anyhow::Result<()> {
    for line in lines {
        let s = CString::new(line.as_str())
            .with_context(|| format!("Line {:?} contains an interior NUL", line))?;
        machine.puts(&s);
        machine.run_ticks(ticks_per_line);
    }
    Ok(())
}

fn run(args: RunArgs) -> u8 {
    info!("Starting Putwire console");
    let machine = match build_machine(args.system.as_deref(), args.no_echo) {
        Ok(m) => m,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    if let Err(e) = write_report(&machine, &args) {
        error!("{:#}", e);
        return EXIT_RUNTIME_ERROR;
    }
    EXIT_PASS
}

fn write_report(machine: &Machine, args: &RunArgs) -> anyhow::Result<()> {
    let metrics = Arc::new(OutputMetrics::new());
    machine.add_observer(metrics.clone())?;
    let drain = machine.with_sink(|s| s.drain_policy())?;

    write_lines(machine, &args.text, args.ticks)?;

    info!(
        "Done: {} stores ({:.0}/s), {} drained, {} lost, drain {:?}",
        metrics.get_writes(),
        metrics.get_wps(),
        metrics.get_drains(),
        metrics.get_overruns(),
        drain
    );

    if let Some(path) = &args.snapshot {
        let json = serde_json::to_string_pretty(&machine.snapshot())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot to {:?}", path))?;
        info!("Snapshot written to {:?}", path);
    }

    Ok(())
}

fn test(args: TestArgs) -> u8 {
    let script = match TestScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    // Resolve the system manifest relative to the script's directory
    let system = script.inputs.system.as_ref().map(|sys| {
        args.script
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(sys)
    });

    let machine = match build_machine(system.as_deref(), args.no_echo) {
        Ok(m) => m,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    if let Err(e) = write_lines(&machine, &script.inputs.lines, script.limits.ticks_per_line) {
        error!("{:#}", e);
        return EXIT_CONFIG_ERROR;
    }
    machine.run_ticks(script.limits.settle_ticks);

    let summary = machine.with_sink(|s| (s.text(), s.writes(), s.lost(), s.register()));
    let (output, writes, lost, register) = match summary {
        Ok(v) => v,
        Err(e) => {
            error!("{}", e);
            return EXIT_RUNTIME_ERROR;
        }
    };

    let assertions: Vec<AssertionResult> = script
        .assertions
        .iter()
        .map(|a| check_assertion(a, &output, lost))
        .collect();
    let passed = assertions.iter().all(|a| a.passed);

    for a in assertions.iter().filter(|a| !a.passed) {
        error!("Assertion failed: {}", a.detail);
    }

    let result = TestResult {
        status: if passed { "pass" } else { "fail" },
        script: args.script.display().to_string(),
        output_sha256: format!("{:x}", Sha256::digest(output.as_bytes())),
        output,
        writes,
        lost,
        register,
        assertions,
    };

    if let Some(dir) = args.output_dir {
        if let Err(e) = write_result(&dir, &result) {
            error!("{:#}", e);
            return EXIT_RUNTIME_ERROR;
        }
    }

    info!("Test {}", result.status);
    if passed {
        EXIT_PASS
    } else {
        EXIT_ASSERT_FAIL
    }
}

fn check_assertion(assertion: &TestAssertion, output: &str, lost: u64) -> AssertionResult {
    let (passed, detail) = match assertion {
        TestAssertion::OutputContains(a) => (
            output.contains(&a.output_contains),
            format!("output contains {:?}", a.output_contains),
        ),
        TestAssertion::OutputEquals(a) => (
            output == a.output_equals,
            format!("output {:?} equals {:?}", output, a.output_equals),
        ),
        TestAssertion::MaxLost(a) => (
            lost <= a.max_lost,
            format!("{} lost values <= {}", lost, a.max_lost),
        ),
    };
    AssertionResult {
        assertion: assertion.clone(),
        passed,
        detail,
    }
}

fn write_result(dir: &Path, result: &TestResult) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;
    let path = dir.join("result.json");
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Result written to {:?}", path);
    Ok(())
}
