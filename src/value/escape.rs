//! The four fixed wire escape sequences for string values (spec §3):
//! carriage return, line feed, space, and tab each map to a literal
//! `</0xNN;>` marker so that string payloads survive the `;`/`,`/`{}`
//! delimited wire grammar untouched. Applied in both directions:
//! escaping on build, unescaping only on demand via `to_string(true)`.

const CR_ESCAPE: &str = "</0x0A;>";
const LF_ESCAPE: &str = "</0x0B;>";
const SPACE_ESCAPE: &str = "</0x0C;>";
const TAB_ESCAPE: &str = "</0x0D;>";

/// Escapes CR, LF, space, and tab in `raw` into their wire-safe markers.
pub fn escape_string(raw: &str) -> String {
    raw.replace('\r', CR_ESCAPE)
        .replace('\n', LF_ESCAPE)
        .replace(' ', SPACE_ESCAPE)
        .replace('\t', TAB_ESCAPE)
}

/// Reverses [`escape_string`], restoring the original characters.
pub fn unescape_string(escaped: &str) -> String {
    escaped
        .replace(CR_ESCAPE, "\r")
        .replace(LF_ESCAPE, "\n")
        .replace(SPACE_ESCAPE, " ")
        .replace(TAB_ESCAPE, "\t")
}
