pub mod address;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest request line accepted from a client, terminator included.
pub const MAX_LINE_LEN: usize = 512;

/// Read one `\n`-terminated request line from `reader`.
/// Returns `None` on a clean EOF; the terminator (and any `\r`) is stripped.
pub async fn read_request_line<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if n >= MAX_LINE_LEN {
            bail!("request line exceeds {} bytes", MAX_LINE_LEN);
        }
        bail!("connection closed mid-line");
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8(buf)?))
}
