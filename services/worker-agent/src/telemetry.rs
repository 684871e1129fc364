//! Host telemetry sampling for health reports.
//!
//! Pure reads of host state: CPU count, load average, memory, and root
//! filesystem usage. Sampling never fails; probes that cannot run on the
//! current platform report zeros and the master treats those as unknown.

use muster_protocol::HealthSample;

/// Take one reading of the host's vital signs.
pub fn sample() -> HealthSample {
    let (total_memory, available_memory) = memory_info();
    let (total_disk, used_disk, free_disk) = disk_usage("/");

    HealthSample {
        cpu_count: cpu_count(),
        load: load_average(),
        total_memory,
        available_memory,
        total_disk,
        used_disk,
        free_disk,
    }
}

fn cpu_count() -> u32 {
    #[cfg(unix)]
    {
        let probed = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if probed > 0 {
            return probed as u32;
        }
    }

    std::thread::available_parallelism()
        .map(|cores| cores.get() as u32)
        .unwrap_or(1)
}

#[cfg(unix)]
fn load_average() -> [f64; 3] {
    let mut loads = [0f64; 3];
    let sampled = unsafe { libc::getloadavg(loads.as_mut_ptr(), 3) };
    if sampled < 0 {
        return [0.0; 3];
    }
    for slot in loads.iter_mut().skip(sampled as usize) {
        *slot = 0.0;
    }
    loads
}

#[cfg(not(unix))]
fn load_average() -> [f64; 3] {
    [0.0; 3]
}

#[cfg(target_os = "linux")]
fn memory_info() -> (u64, u64) {
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        return parse_meminfo(&meminfo);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let total_pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let avail_pages = unsafe { libc::sysconf(libc::_SC_AVPHYS_PAGES) };

    if page_size > 0 && total_pages > 0 {
        let total = (page_size * total_pages) as u64;
        let available = if avail_pages > 0 {
            (page_size * avail_pages) as u64
        } else {
            total
        };
        return (total, available);
    }

    (0, 0)
}

#[cfg(not(target_os = "linux"))]
fn memory_info() -> (u64, u64) {
    #[cfg(unix)]
    {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let total_pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };

        if page_size > 0 && total_pages > 0 {
            let total = (page_size * total_pages) as u64;
            return (total, total / 2);
        }
    }

    (0, 0)
}

#[cfg(target_os = "linux")]
fn parse_meminfo(content: &str) -> (u64, u64) {
    let mut total: u64 = 0;
    let mut available: u64 = 0;
    let mut free: u64 = 0;
    let mut buffers: u64 = 0;
    let mut cached: u64 = 0;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(label), Some(figure)) = (fields.next(), fields.next()) else {
            continue;
        };
        let bytes = figure.parse::<u64>().unwrap_or(0) * 1024;
        match label {
            "MemTotal:" => total = bytes,
            "MemAvailable:" => available = bytes,
            "MemFree:" => free = bytes,
            "Buffers:" => buffers = bytes,
            "Cached:" => cached = bytes,
            _ => {}
        }
    }

    // Older kernels have no MemAvailable
    if available == 0 {
        available = free + buffers + cached;
    }

    (total, available)
}

/// Root filesystem usage as (total, used, free) bytes.
///
/// `used` counts blocks unavailable even to root; `free` is what an
/// unprivileged job could still write, matching how the master's dashboard
/// reads these figures.
#[cfg(unix)]
fn disk_usage(path: &str) -> (u64, u64, u64) {
    let c_path = match std::ffi::CString::new(path) {
        Ok(p) => p,
        Err(_) => return (0, 0, 0),
    };

    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) };
    if rc != 0 {
        return (0, 0, 0);
    }

    let fragment = if stats.f_frsize > 0 {
        stats.f_frsize as u64
    } else {
        stats.f_bsize as u64
    };

    let total = stats.f_blocks as u64 * fragment;
    let used = total.saturating_sub(stats.f_bfree as u64 * fragment);
    let free = stats.f_bavail as u64 * fragment;
    (total, used, free)
}

#[cfg(not(unix))]
fn disk_usage(_path: &str) -> (u64, u64, u64) {
    (0, 0, 0)
}
