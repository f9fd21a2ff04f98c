// SPDX-License-Identifier: GPL-3.0-only

//! Helpers for the NUL-terminated `ay` strings UDisks2 uses for paths.

pub(crate) fn decode_c_string_bytes(bytes: &[u8]) -> String {
    let raw = match bytes.split(|b| *b == 0).next() {
        Some(v) => v,
        None => bytes,
    };

    String::from_utf8_lossy(raw).to_string()
}

/// Decodes a list of `ay` paths, dropping empty entries.
pub fn decode_mount_points<I>(mount_points: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    mount_points
        .into_iter()
        .filter_map(|mp| {
            let decoded = decode_c_string_bytes(mp.as_ref());
            if decoded.is_empty() {
                None
            } else {
                Some(decoded)
            }
        })
        .collect()
}
