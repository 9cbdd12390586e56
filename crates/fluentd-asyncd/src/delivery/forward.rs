//! MessagePack encoding of Fluentd forward-protocol messages.
//!
//! A message is `[tag, time, record]`, or `[tag, time, record, options]` when
//! an acknowledgement is requested. `time` is whole seconds unless sub-second
//! precision is enabled, in which case it is the `EventTime` extension:
//! type 0, eight bytes of big-endian seconds then nanoseconds.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use super::{DeliveryError, Record};

const EVENT_TIME_EXT_TYPE: i8 = 0;
const EVENT_TIME_LEN: u32 = 8;

/// Reply sent by the collector for an acknowledged chunk.
#[derive(Debug, Deserialize)]
pub(crate) struct AckResponse {
    pub(crate) ack: String,
}

/// Encodes one event in forward mode.
pub(crate) fn encode_event(
    tag: &str,
    time: SystemTime,
    record: &Record,
    sub_second_precision: bool,
    chunk: Option<&str>,
) -> Result<Vec<u8>, DeliveryError> {
    let mut buf = Vec::with_capacity(64 + record.len() * 32);
    let fields = if chunk.is_some() { 4 } else { 3 };

    rmp::encode::write_array_len(&mut buf, fields).map_err(encode_error)?;
    rmp::encode::write_str(&mut buf, tag).map_err(encode_error)?;
    write_time(&mut buf, time, sub_second_precision)?;
    rmp_serde::encode::write(&mut buf, record).map_err(encode_error)?;

    if let Some(chunk) = chunk {
        rmp::encode::write_map_len(&mut buf, 1).map_err(encode_error)?;
        rmp::encode::write_str(&mut buf, "chunk").map_err(encode_error)?;
        rmp::encode::write_str(&mut buf, chunk).map_err(encode_error)?;
    }

    Ok(buf)
}

fn write_time(
    buf: &mut Vec<u8>,
    time: SystemTime,
    sub_second_precision: bool,
) -> Result<(), DeliveryError> {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();

    if !sub_second_precision {
        rmp::encode::write_uint(buf, since_epoch.as_secs()).map_err(encode_error)?;
        return Ok(());
    }

    let seconds = u32::try_from(since_epoch.as_secs())
        .map_err(|_| DeliveryError::encode("event time does not fit EventTime seconds"))?;
    rmp::encode::write_ext_meta(buf, EVENT_TIME_LEN, EVENT_TIME_EXT_TYPE).map_err(encode_error)?;
    buf.write_all(&seconds.to_be_bytes())
        .and_then(|()| buf.write_all(&since_epoch.subsec_nanos().to_be_bytes()))
        .map_err(encode_error)
}

fn encode_error(error: impl std::fmt::Display) -> DeliveryError {
    DeliveryError::encode(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    use super::*;

    fn record() -> Record {
        BTreeMap::from([
            (String::from("log"), String::from("hello")),
            (String::from("source"), String::from("stdout")),
        ])
    }

    fn at(seconds: u64, nanos: u32) -> SystemTime {
        UNIX_EPOCH + Duration::new(seconds, nanos)
    }

    #[test]
    fn encodes_tag_seconds_and_record() {
        let bytes =
            encode_event("app", at(1_700_000_000, 5), &record(), false, None).expect("encode");
        let (tag, time, decoded): (String, u64, Record) =
            rmp_serde::from_slice(&bytes).expect("decode");
        assert_eq!(tag, "app");
        assert_eq!(time, 1_700_000_000);
        assert_eq!(decoded, record());
    }

    #[test]
    fn sub_second_precision_uses_event_time_extension() {
        let bytes = encode_event("app", at(0x0102_0304, 0x0506_0708), &record(), true, None)
            .expect("encode");
        // fixext 8 marker, type 0, seconds then nanoseconds.
        let expected = [
            0xd7, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        ];
        assert!(
            bytes.windows(expected.len()).any(|window| window == expected),
            "EventTime extension missing from {bytes:02x?}"
        );
    }

    #[test]
    fn chunk_option_is_appended_when_acknowledging() {
        let bytes =
            encode_event("app", at(1, 0), &record(), false, Some("c29tZS1jaHVuaw==")).expect("encode");
        let (_, _, _, options): (String, u64, Record, HashMap<String, String>) =
            rmp_serde::from_slice(&bytes).expect("decode");
        assert_eq!(
            options.get("chunk").map(String::as_str),
            Some("c29tZS1jaHVuaw==")
        );
    }
}
