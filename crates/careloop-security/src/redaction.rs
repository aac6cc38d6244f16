use tracing_subscriber::fmt::MakeWriter;

/// A writer that redacts provider credentials and webhook secrets from log
/// output before it reaches the terminal or a log shipper.
pub struct RedactingWriter<W> {
    inner: W,
}

impl RedactingWriter<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self {
            inner: std::io::stderr(),
        }
    }
}

impl<W: std::io::Write> std::io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let original = String::from_utf8_lossy(buf);
        let redacted = redact_secrets(&original);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for RedactingWriter<std::io::Stderr> {
    type Writer = RedactingWriter<std::io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: std::io::stderr(),
        }
    }
}

/// Replace known credential patterns with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    // Patterns: voice provider API keys, webhook signing secrets,
    // WhatsApp graph tokens, generic bearer tokens
    static PATTERNS: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(
            r"(?x)
              xi-api-key[=:\s]+\S{10,}     # voice provider API keys
            | whsec_\S{10,}                # webhook signing secrets
            | EAA[A-Za-z0-9]{20,}          # WhatsApp graph access tokens
            | Bearer\s+[A-Za-z0-9_\-.]{20,} # generic bearer tokens
            ",
        )
        .expect("redaction regex should compile")
    });

    PATTERNS.replace_all(input, "[REDACTED]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_webhook_secret() {
        let input = "secret=whsec_abcdef0123456789";
        assert_eq!(redact_secrets(input), "secret=[REDACTED]");
    }

    #[test]
    fn redacts_voice_api_key() {
        let input = "header xi-api-key: sk0123456789abcdef";
        assert_eq!(redact_secrets(input), "header [REDACTED]");
    }

    #[test]
    fn redacts_graph_token() {
        let input = "token=EAAGm0PX4ZCpsBAKZBZBZC123456789";
        assert_eq!(redact_secrets(input), "token=[REDACTED]");
    }

    #[test]
    fn leaves_normal_text_unchanged() {
        let input = "glucose reading saved for patient";
        assert_eq!(redact_secrets(input), input);
    }
}
