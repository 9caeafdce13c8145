use std::path::PathBuf;

const NETDASH_DB: &str = "NETDASH_DB";

const DEFAULT_DB_PATH: &str = "data/netdash.db";

pub fn get_default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

pub fn get_db_path() -> Option<PathBuf> {
    std::env::var(NETDASH_DB).ok().map(PathBuf::from)
}

const NETDASH_SPEEDTEST_BIN: &str = "NETDASH_SPEEDTEST_BIN";

pub fn get_speedtest_bin() -> Option<PathBuf> {
    std::env::var(NETDASH_SPEEDTEST_BIN).ok().map(PathBuf::from)
}

const UNIT: u64 = 1024;

const PREFIXES: &[u8] = b"KMGTPE";

/// Format a byte count with binary prefixes, e.g. `1536` → `"1.50 KB"`
pub fn format_bytes(bytes: u64) -> String {
    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!(
        "{:.2} {}B",
        bytes as f64 / div as f64,
        PREFIXES[exp] as char
    )
}
