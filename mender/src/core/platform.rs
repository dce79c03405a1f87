//! Platform strategies mapping catalog tools to shell command templates.

use std::fmt;

use tracing::warn;

/// Command dialect of the target host.
///
/// Only Debian-family hosts are supported; unknown distributions fall back to
/// the Debian strategy with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Debian,
}

impl Platform {
    /// Detect the platform from the contents of `/etc/os-release`.
    pub fn detect(os_release: &str) -> Self {
        let ids: Vec<String> = os_release
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                matches!(key.trim(), "ID" | "ID_LIKE")
                    .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
            })
            .collect();

        let debian_like = ids
            .iter()
            .flat_map(|value| value.split_whitespace())
            .any(|id| matches!(id, "debian" | "ubuntu"));
        if !debian_like {
            warn!(ids = ?ids, "unrecognized target platform, falling back to debian");
        }
        Platform::Debian
    }

    /// Command template for `tool`, or `None` when the tool is not
    /// executable on this platform.
    pub fn template(self, tool: &str) -> Option<&'static str> {
        match self {
            Platform::Debian => debian_template(tool),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Debian => "debian",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn debian_template(tool: &str) -> Option<&'static str> {
    let template = match tool {
        "list_processes" => "ps aux --sort=-%mem | head -n 10",
        "kill_process" => "kill {force?-9|-15} {pid}",
        "list_directory" => "ls -F -- {path}",
        "read_log" => "tail -n {lines=20} -- {path}",
        "grep_file" => "grep -nC 2 -e {pattern} -- {path}",
        "write_file" => "printf '%s' {content} > {path}",
        "check_service" => "systemctl status --no-pager -- {service}",
        "restart_service" => "systemctl restart -- {service}",
        "get_net_stats" => "ss -tuln",
        _ => return None,
    };
    Some(template)
}
