//! Configuration for the display gadget service.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use usbdisp_core::pipeline::PipelineConfig;
use usbdisp_core::surface::BITS_PER_PIXEL;
use usbdisp_core::{ByteOrder, DisplayError, MemorySurface, RingMode, slot_capacity_for};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GadgetConfig {
    /// Panel geometry.
    pub display: DisplayConfig,
    /// Slot ring sizing.
    pub ring: RingConfig,
    /// Wire protocol options.
    pub protocol: ProtocolConfig,
    /// Where chunks come from.
    pub transport: TransportConfig,
    /// What to do with the result.
    pub output: OutputConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Only 16 is supported.
    pub bits_per_pixel: u32,
    /// Row pitch in bytes (0 = tightly packed).
    pub stride_bytes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Number of message slots (at least 2).
    pub slots: usize,
    /// Refuse commits instead of overwriting unconsumed slots.
    pub backpressure: bool,
    /// Bytes per slot (0 = one full frame plus RLE overhead).
    pub slot_capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Byte order of the blit header: "native", "little" or "big".
    pub header_byte_order: ByteOrder,
}

/// Chunk source selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Udp,
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// UDP address to receive chunks on.
    pub listen: String,
    /// Recorded chunk stream to play back.
    pub replay_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write the final surface here on exit. Empty = don't.
    pub dump_path: String,
    /// Print the pipeline counters as JSON on exit.
    pub stats_json: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
            bits_per_pixel: BITS_PER_PIXEL,
            stride_bytes: 0,
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            slots: 2,
            backpressure: false,
            slot_capacity: 0,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Udp,
            listen: "0.0.0.0:7340".into(),
            replay_path: "usbdisp.replay".into(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dump_path: String::new(),
            stats_json: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl GadgetConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Check the display section and convert ring settings into a
    /// core `PipelineConfig`.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, DisplayError> {
        let d = &self.display;
        if d.bits_per_pixel != BITS_PER_PIXEL {
            return Err(DisplayError::InvalidConfig(format!(
                "unsupported pixel depth {} (only {BITS_PER_PIXEL} bpp)",
                d.bits_per_pixel
            )));
        }
        if d.width == 0 || d.height == 0 || d.width > u16::MAX as u32 || d.height > u16::MAX as u32 {
            return Err(DisplayError::InvalidConfig(format!(
                "bad panel size {}x{}",
                d.width, d.height
            )));
        }

        let slot_capacity = match self.ring.slot_capacity {
            0 => slot_capacity_for(d.width, d.height, d.bits_per_pixel),
            n => n,
        };
        let cfg = PipelineConfig {
            slots: self.ring.slots,
            slot_capacity,
            mode: if self.ring.backpressure { RingMode::Backpressure } else { RingMode::Overwrite },
            byte_order: self.protocol.header_byte_order,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Allocate the surface described by `[display]`.
    pub fn make_surface(&self) -> Result<MemorySurface, DisplayError> {
        let d = &self.display;
        match d.stride_bytes {
            0 => Ok(MemorySurface::new(d.width, d.height)),
            stride => MemorySurface::with_stride(d.width, d.height, stride),
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, DisplayError> {
        self.transport
            .listen
            .parse()
            .map_err(|e| DisplayError::InvalidConfig(format!("listen address {:?}: {e}", self.transport.listen)))
    }

    pub fn replay_path(&self) -> PathBuf {
        PathBuf::from(&self.transport.replay_path)
    }

    /// Surface dump destination, if any.
    pub fn dump_path(&self) -> Option<PathBuf> {
        (!self.output.dump_path.is_empty()).then(|| PathBuf::from(&self.output.dump_path))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&GadgetConfig::default()).unwrap();
        assert!(text.contains("[ring]"));
        assert!(text.contains("header_byte_order = \"native\""));
        assert!(text.contains("kind = \"udp\""));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&GadgetConfig::default()).unwrap();
        let parsed: GadgetConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.display.width, 800);
        assert_eq!(parsed.ring.slots, 2);
        assert!(parsed.output.stats_json);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: GadgetConfig = toml::from_str(
            "[ring]\nbackpressure = true\n\n[protocol]\nheader_byte_order = \"big\"\n\n[transport]\nkind = \"replay\"\n",
        )
        .unwrap();
        assert_eq!(parsed.display.height, 480);
        assert_eq!(parsed.transport.kind, TransportKind::Replay);

        let cfg = parsed.to_pipeline_config().unwrap();
        assert_eq!(cfg.mode, RingMode::Backpressure);
        assert_eq!(cfg.byte_order, ByteOrder::Big);
    }

    #[test]
    fn derives_slot_capacity_from_panel() {
        let cfg = GadgetConfig::default().to_pipeline_config().unwrap();
        assert_eq!(cfg.slot_capacity, 771_000);
        assert_eq!(cfg.mode, RingMode::Overwrite);

        let mut custom = GadgetConfig::default();
        custom.ring.slot_capacity = 4096;
        assert_eq!(custom.to_pipeline_config().unwrap().slot_capacity, 4096);
    }

    #[test]
    fn rejects_unsupported_values() {
        let mut cfg = GadgetConfig::default();
        cfg.display.bits_per_pixel = 24;
        assert!(cfg.to_pipeline_config().is_err());

        let mut cfg = GadgetConfig::default();
        cfg.ring.slots = 1;
        assert!(cfg.to_pipeline_config().is_err());

        let mut cfg = GadgetConfig::default();
        cfg.transport.listen = "not an address".into();
        assert!(cfg.listen_addr().is_err());
    }

    #[test]
    fn surface_honours_stride() {
        let mut cfg = GadgetConfig::default();
        cfg.display.width = 10;
        cfg.display.height = 2;
        cfg.display.stride_bytes = 32;
        assert_eq!(cfg.make_surface().unwrap().stride(), 32);

        cfg.display.stride_bytes = 8;
        assert!(cfg.make_surface().is_err());
        assert!(cfg.dump_path().is_none());
    }
}
