use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_RAM_BASE: u64 = 0x2000_0000;
pub const DEFAULT_RAM_SIZE: &str = "64KB";
/// `DEFAULT_RAM_SIZE` in bytes.
pub const DEFAULT_RAM_BYTES: u64 = 64 * 1024;
/// Largest RAM a manifest may ask the simulator to allocate.
pub const MAX_RAM_SIZE: u64 = 256 * 1024 * 1024;
pub const DEFAULT_SINK_BASE: u64 = 0x4000_C000;

/// Sink register window: data word at 0x0, status word at 0x4.
pub const SINK_WINDOW_SIZE: u64 = 0x8;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MemoryRange {
    pub base: u64,
    pub size: String, // e.g. "64KB"
}

impl Default for MemoryRange {
    fn default() -> Self {
        Self {
            base: DEFAULT_RAM_BASE,
            size: DEFAULT_RAM_SIZE.to_string(),
        }
    }
}

/// How the external consumer takes values out of the output register.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Every write is consumed before the writer continues.
    #[default]
    Synchronous,
    /// At most one pending value is consumed per peripheral tick.
    OnTick,
    /// Nothing consumes the register; only the last value remains visible.
    Never,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SinkDescriptor {
    #[serde(default = "default_sink_base")]
    pub base_address: u64,
    #[serde(default)]
    pub drain: DrainPolicy,
    /// Mirror drained characters to the host's stdout.
    #[serde(default = "default_echo")]
    pub echo: bool,
}

fn default_sink_base() -> u64 {
    DEFAULT_SINK_BASE
}

fn default_echo() -> bool {
    true
}

impl Default for SinkDescriptor {
    fn default() -> Self {
        Self {
            base_address: DEFAULT_SINK_BASE,
            drain: DrainPolicy::default(),
            echo: default_echo(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SystemManifest {
    pub name: String,
    #[serde(default)]
    pub ram: MemoryRange,
    #[serde(default)]
    pub sink: SinkDescriptor,
}

impl Default for SystemManifest {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            ram: MemoryRange::default(),
            sink: SinkDescriptor::default(),
        }
    }
}

impl SystemManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open system manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse System Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn ram_size(&self) -> Result<u64> {
        parse_size(&self.ram.size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("System manifest 'name' cannot be empty");
        }

        let ram_size = self.ram_size()?;
        if ram_size == 0 {
            anyhow::bail!("RAM size must be greater than zero");
        }
        if ram_size > MAX_RAM_SIZE {
            anyhow::bail!(
                "RAM size {} exceeds the maximum of {}",
                ram_size,
                MAX_RAM_SIZE
            );
        }

        let ram_end = self.ram.base.checked_add(ram_size).with_context(|| {
            format!(
                "RAM {:#x}+{:#x} runs past the end of the address space",
                self.ram.base, ram_size
            )
        })?;
        let sink_base = self.sink.base_address;
        let sink_end = sink_base.checked_add(SINK_WINDOW_SIZE).with_context(|| {
            format!(
                "Sink window at {:#x} runs past the end of the address space",
                sink_base
            )
        })?;
        if sink_base < ram_end && self.ram.base < sink_end {
            anyhow::bail!(
                "Sink at {:#x} overlaps RAM {:#x}..{:#x}",
                sink_base,
                self.ram.base,
                ram_end
            );
        }

        if sink_base % 4 != 0 {
            anyhow::bail!("Sink base address {:#x} must be word aligned", sink_base);
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    /// Each line is written with `puts`.
    pub lines: Vec<String>,
    pub system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    /// Peripheral ticks run after each line.
    #[serde(default)]
    pub ticks_per_line: u64,
    /// Ticks run after all lines are written, to let a slow sink drain.
    #[serde(default)]
    pub settle_ticks: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct OutputContainsAssertion {
    pub output_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct OutputEqualsAssertion {
    pub output_equals: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MaxLostAssertion {
    pub max_lost: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    OutputContains(OutputContainsAssertion),
    OutputEquals(OutputEqualsAssertion),
    MaxLost(MaxLostAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    pub inputs: TestInputs,
    #[serde(default)]
    pub limits: TestLimits,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

pub const MAX_ALLOWED_TICKS: u64 = 10_000_000;

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if let Some(line) = self.inputs.lines.iter().find(|l| l.contains('\0')) {
            anyhow::bail!("Input line {:?} contains an interior NUL", line);
        }

        let total = self
            .limits
            .ticks_per_line
            .saturating_mul(self.inputs.lines.len() as u64)
            .saturating_add(self.limits.settle_ticks);
        if total > MAX_ALLOWED_TICKS {
            anyhow::bail!(
                "Tick budget {} exceeds the maximum of {}",
                total,
                MAX_ALLOWED_TICKS
            );
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
