// BYTE-COUNT FORMATTING
//
// SHARED BY THE `status` AND `writers` SUBCOMMANDS: GB/MB/KB, ONE DECIMAL
// PLACE, C LOCALE (A LITERAL `.`, NEVER A LOCALE-DEPENDENT DECIMAL COMMA OR
// THOUSANDS GROUPING)

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Format `bytes` as the largest whole unit (GB/MB/KB) that keeps the
/// magnitude at or above 1.0, with one decimal place. Byte counts under
/// 1 KB are rendered in bytes with no decimal.
pub fn human_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.1}GB", b / GIB)
    } else if b >= MIB {
        format!("{:.1}MB", b / MIB)
    } else if b >= KIB {
        format!("{:.1}KB", b / KIB)
    } else {
        format!("{bytes}B")
    }
}
