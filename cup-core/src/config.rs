//! Ambient configuration read from the environment variables named in
//! spec §6, gathered once into a plain struct instead of scattered
//! `std::env::var` calls — the same "populate a struct once, thread it
//! explicitly" shape also used for clap-derived `Args` structs.

use std::env;

#[derive(Debug, Clone, Default)]
pub struct CupConfig {
    /// `CUP_CDP_HOST` — defaults to `127.0.0.1`.
    pub cdp_host: Option<String>,
    /// `CUP_CDP_PORT` — defaults to `9222`.
    pub cdp_port: Option<u16>,
    /// `DISPLAY` (Linux/X11 only; AT-SPI2 itself talks D-Bus, but some
    /// fallback synthetic-input paths need an X display).
    pub display: Option<String>,
    pub xdg_data_home: Option<String>,
    pub xdg_data_dirs: Option<String>,
    pub gdk_scale: Option<f64>,
    pub qt_scale_factor: Option<f64>,
}

impl CupConfig {
    pub fn from_env() -> Self {
        Self {
            cdp_host: env::var("CUP_CDP_HOST").ok(),
            cdp_port: env::var("CUP_CDP_PORT").ok().and_then(|v| v.parse().ok()),
            display: env::var("DISPLAY").ok(),
            xdg_data_home: env::var("XDG_DATA_HOME").ok(),
            xdg_data_dirs: env::var("XDG_DATA_DIRS").ok(),
            gdk_scale: env::var("GDK_SCALE").ok().and_then(|v| v.parse().ok()),
            qt_scale_factor: env::var("QT_SCALE_FACTOR").ok().and_then(|v| v.parse().ok()),
        }
    }

    pub fn cdp_host_or_default(&self) -> &str {
        self.cdp_host.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn cdp_port_or_default(&self) -> u16 {
        self.cdp_port.unwrap_or(9222)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let c = CupConfig::default();
        assert_eq!(c.cdp_host_or_default(), "127.0.0.1");
        assert_eq!(c.cdp_port_or_default(), 9222);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let c = CupConfig {
            cdp_host: Some("example.test".into()),
            cdp_port: Some(9333),
            ..Default::default()
        };
        assert_eq!(c.cdp_host_or_default(), "example.test");
        assert_eq!(c.cdp_port_or_default(), 9333);
    }
}
