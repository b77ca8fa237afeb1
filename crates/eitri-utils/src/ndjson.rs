/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Newline-delimited JSON framing over a chunked byte stream.
//!
//! Both long-lived stream endpoints (the server-to-agent release stream and
//! the agent-to-server services stream) carry one JSON document per line.
//! Chunk boundaries do not align with line boundaries, so both sides share
//! this buffering helper.

use futures::{Stream, StreamExt};

/// Reads the next complete line from `stream`, buffering partial chunks in
/// `buf` across calls. Blank lines are skipped.
///
/// Returns `Ok(None)` once the stream is exhausted; a trailing unterminated
/// line is returned before the end is reported. Transport errors are passed
/// through unchanged.
pub async fn next_line<S, B, E>(stream: &mut S, buf: &mut Vec<u8>) -> Result<Option<String>, E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    loop {
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..pos]).trim().to_string();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line));
        }

        match stream.next().await {
            Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
            Some(Err(e)) => return Err(e),
            None => {
                let line = String::from_utf8_lossy(buf).trim().to_string();
                buf.clear();
                if line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(line));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let mut s = chunks(&["{\"a\"", ":1}\n{\"b\":2}\n"]);
        let mut buf = Vec::new();

        assert_eq!(
            next_line(&mut s, &mut buf).await.unwrap(),
            Some("{\"a\":1}".to_string())
        );
        assert_eq!(
            next_line(&mut s, &mut buf).await.unwrap(),
            Some("{\"b\":2}".to_string())
        );
        assert_eq!(next_line(&mut s, &mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multiple_lines_in_one_chunk() {
        let mut s = chunks(&["one\ntwo\nthree\n"]);
        let mut buf = Vec::new();

        assert_eq!(next_line(&mut s, &mut buf).await.unwrap().unwrap(), "one");
        assert_eq!(next_line(&mut s, &mut buf).await.unwrap().unwrap(), "two");
        assert_eq!(next_line(&mut s, &mut buf).await.unwrap().unwrap(), "three");
        assert_eq!(next_line(&mut s, &mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_trailing_unterminated_line() {
        let mut s = chunks(&["first\nlast"]);
        let mut buf = Vec::new();

        assert_eq!(next_line(&mut s, &mut buf).await.unwrap().unwrap(), "first");
        assert_eq!(next_line(&mut s, &mut buf).await.unwrap().unwrap(), "last");
        assert_eq!(next_line(&mut s, &mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let mut s = chunks(&["\n\nvalue\n\n"]);
        let mut buf = Vec::new();

        assert_eq!(next_line(&mut s, &mut buf).await.unwrap().unwrap(), "value");
        assert_eq!(next_line(&mut s, &mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_is_passed_through() {
        let items: Vec<Result<Vec<u8>, String>> =
            vec![Ok(b"ok\n".to_vec()), Err("boom".to_string())];
        let mut s = stream::iter(items);
        let mut buf = Vec::new();

        assert_eq!(next_line(&mut s, &mut buf).await.unwrap().unwrap(), "ok");
        assert_eq!(next_line(&mut s, &mut buf).await.unwrap_err(), "boom");
    }
}
