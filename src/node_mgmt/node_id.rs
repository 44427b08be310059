use std::fs;

use sysinfo::System;

const CPUINFO_PATH: &str = "/proc/cpuinfo";
const NAME_PREFIX: &str = "Raspi-";
const NAME_SERIAL_CHARS: usize = 8;

/// Value of the `Serial` line in a `/proc/cpuinfo` dump
fn cpu_serial(cpuinfo: &str) -> Option<String> {
    cpuinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case("serial")
            && !value.is_empty()
            && value.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| value.to_string())
    })
}

/// Board serial number, or the host name on machines that do not expose one
pub fn node_serial() -> String {
    if let Some(serial) = fs::read_to_string(CPUINFO_PATH)
        .ok()
        .and_then(|info| cpu_serial(&info))
    {
        return serial;
    }
    log::debug!("No CPU serial in {CPUINFO_PATH}, using host name");
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}

pub fn default_device_name(serial: &str) -> String {
    let chars: Vec<char> = serial.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(NAME_SERIAL_CHARS)..]
        .iter()
        .collect();
    format!("{NAME_PREFIX}{tail}")
}
