use crate::error::PollError;
use crate::types::MemorySnapshot;

/// Read total and free physical memory of this host.
#[cfg(target_os = "linux")]
pub fn read_memory() -> Result<MemorySnapshot, PollError> {
    match std::fs::read_to_string("/proc/meminfo") {
        Ok(contents) => parse_meminfo(&contents),
        Err(e) => {
            tracing::debug!("/proc/meminfo unreadable ({}), falling back to sysinfo(2)", e);
            read_sysinfo()
        }
    }
}

#[cfg(target_os = "macos")]
pub fn read_memory() -> Result<MemorySnapshot, PollError> {
    use std::process::Command;

    let total_output = Command::new("sysctl")
        .args(["-n", "hw.memsize"])
        .output()
        .map_err(|e| PollError::Memory(format!("sysctl: {}", e)))?;
    let total_bytes: u64 = String::from_utf8_lossy(&total_output.stdout)
        .trim()
        .parse()
        .map_err(|e| PollError::Memory(format!("hw.memsize: {}", e)))?;

    let vm_output = Command::new("vm_stat")
        .output()
        .map_err(|e| PollError::Memory(format!("vm_stat: {}", e)))?;
    let free_bytes = parse_vm_stat_free(&String::from_utf8_lossy(&vm_output.stdout))?;

    Ok(MemorySnapshot {
        total_bytes,
        free_bytes,
    })
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn read_memory() -> Result<MemorySnapshot, PollError> {
    Err(PollError::Memory("unsupported platform".to_string()))
}

/// Parse `MemTotal` and `MemFree` (kB) out of `/proc/meminfo`.
pub fn parse_meminfo(contents: &str) -> Result<MemorySnapshot, PollError> {
    let mut total_kb = None;
    let mut free_kb = None;

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let target = match fields.next() {
            Some("MemTotal:") => &mut total_kb,
            Some("MemFree:") => &mut free_kb,
            _ => continue,
        };
        *target = fields.next().and_then(|v| v.parse::<u64>().ok());
    }

    match (total_kb, free_kb) {
        (Some(total), Some(free)) => Ok(MemorySnapshot {
            total_bytes: total * 1024,
            free_bytes: free * 1024,
        }),
        _ => Err(PollError::Memory(
            "MemTotal/MemFree missing from /proc/meminfo".to_string(),
        )),
    }
}

#[cfg(target_os = "linux")]
fn read_sysinfo() -> Result<MemorySnapshot, PollError> {
    let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
    if unsafe { libc::sysinfo(&mut info) } != 0 {
        return Err(PollError::Memory(format!(
            "sysinfo: {}",
            std::io::Error::last_os_error()
        )));
    }
    let unit = u64::from(info.mem_unit.max(1));
    Ok(MemorySnapshot {
        total_bytes: info.totalram as u64 * unit,
        free_bytes: info.freeram as u64 * unit,
    })
}

/// Free pages from `vm_stat` output, scaled by the page size it reports.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub fn parse_vm_stat_free(output: &str) -> Result<u64, PollError> {
    let page_size = output
        .lines()
        .next()
        .and_then(|header| header.split("page size of ").nth(1))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(4096);

    output
        .lines()
        .find(|line| line.starts_with("Pages free:"))
        .and_then(|line| line.split_whitespace().nth(2))
        .and_then(|v| v.trim_end_matches('.').parse::<u64>().ok())
        .map(|pages| pages * page_size)
        .ok_or_else(|| PollError::Memory("Pages free missing from vm_stat".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_meminfo_totals() {
        let meminfo = "MemTotal:       16777216 kB\n\
                       MemFree:         8388608 kB\n\
                       MemAvailable:   12000000 kB\n";
        let snapshot = parse_meminfo(meminfo).unwrap();
        assert_eq!(snapshot.total_bytes, 16_777_216 * 1024);
        assert_eq!(snapshot.free_bytes, 8_388_608 * 1024);
        assert_eq!(snapshot.to_string(), "total=16.00 GB, free=8.00 GB");
    }

    #[test]
    fn meminfo_without_free_is_an_error() {
        let err = parse_meminfo("MemTotal: 1024 kB\n").unwrap_err();
        assert!(matches!(err, PollError::Memory(_)));
    }

    #[test]
    fn parses_vm_stat_free_pages() {
        let output = "Mach Virtual Memory Statistics: (page size of 16384 bytes)\n\
                      Pages free:                               10.\n\
                      Pages active:                             99.\n";
        assert_eq!(parse_vm_stat_free(output).unwrap(), 10 * 16384);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reads_host_memory() {
        let snapshot = read_memory().unwrap();
        assert!(snapshot.total_bytes > 0);
        assert!(snapshot.free_bytes <= snapshot.total_bytes);
    }
}
