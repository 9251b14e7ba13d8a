use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// A fetched document decoded to UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode bytes with {encoding}")]
    DecodeFailure { encoding: String },
}

/// Decode raw page bytes into UTF-8.
///
/// Listing pages are frequently Shift_JIS or EUC-JP, so the order matters:
/// BOM first, then the Content-Type charset, then chardetng detection over
/// the full body.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> Result<DecodedHtml, DecodeError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(encoding) = content_type
        .and_then(charset_label)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, encoding);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let part = part.trim();
        match part.get(..8) {
            Some(prefix) if prefix.eq_ignore_ascii_case("charset=") => {
                Some(part[8..].trim_matches(['"', '\'', ' ']).to_string())
            }
            _ => None,
        }
    })
}

fn decode_with(bytes: &[u8], encoding: &'static Encoding) -> Result<DecodedHtml, DecodeError> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: encoding.name().to_string(),
        });
    }
    Ok(DecodedHtml {
        html: text.into_owned(),
        encoding_label: encoding.name().to_string(),
    })
}
