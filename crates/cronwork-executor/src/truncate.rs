//! Output truncation.
//!
//! Command output can be arbitrarily large (`find /`, a chatty build) and
//! every byte ends up in the execution log. Middle-omission keeps both the
//! beginning (what the command started doing) and the end (the final result
//! or error) of the output.

/// Truncate `output` to roughly `max_bytes` using middle-omission.
///
/// Output that fits is returned unchanged. Otherwise the result is:
///
/// ```text
/// <first max_bytes/2 bytes>
///
/// ... [OUTPUT TRUNCATED: N bytes omitted] ...
///
/// <last max_bytes/2 bytes>
/// ```
///
/// Splitting happens on byte offsets; a multi-byte character cut in half is
/// rendered as U+FFFD when the log record is built.
pub fn truncate_output(output: Vec<u8>, max_bytes: usize) -> Vec<u8> {
    let total = output.len();
    if total <= max_bytes {
        return output;
    }

    let half = max_bytes / 2;
    let omitted = total - 2 * half;
    let marker = format!("\n\n... [OUTPUT TRUNCATED: {omitted} bytes omitted] ...\n\n");

    let mut truncated = Vec::with_capacity(2 * half + marker.len());
    truncated.extend_from_slice(&output[..half]);
    truncated.extend_from_slice(marker.as_bytes());
    truncated.extend_from_slice(&output[total - half..]);
    truncated
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
