//! Quadrature sample chunk decoding

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use byteorder::{ByteOrder, LittleEndian};
use log::{error, trace};

// Internal
use super::{DecodeError, Encoder, KEEPALIVE_FLAG, SAMPLE_SIZE};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Quadrature transition table, indexed by [old state][new state].
///
/// The two pin levels form a 2-bit Gray code. Single-step transitions map to
/// a direction delta, staying in the same state maps to zero, and a double
/// step (both bits flipped at once) is invalid: at least one intermediate
/// sample was lost, so no direction can be inferred.
const QEM: [[Option<i8>; 4]; 4] = [
    [Some(0), Some(1), Some(-1), None],
    [Some(-1), Some(0), None, Some(1)],
    [Some(1), None, Some(0), Some(-1)],
    [None, Some(-1), Some(1), Some(0)],
];

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Encoder {
    /// Decode a chunk of notifier sample records.
    ///
    /// A chunk holds one or more consecutive [`SAMPLE_SIZE`] byte records
    /// `{seq: u16, flags: u16, time_us: u32, levels: u32}`, little-endian.
    /// Keepalive records are skipped. Every other record's pin bits are
    /// looked up against the previous quadrature state and any resulting
    /// direction delta is fed to [`Encoder::tick`].
    ///
    /// A malformed (truncated) record is logged together with the offending
    /// bytes and the remainder of the chunk is abandoned. The next chunk is
    /// processed normally.
    pub fn handle_chunk(&self, chunk: &[u8]) {
        let mut rest = chunk;

        while !rest.is_empty() {
            if rest.len() < SAMPLE_SIZE {
                error!(
                    "Encoder {}: {}",
                    self.id(),
                    DecodeError::TruncatedRecord(rest.len())
                );
                error!("Encoder {}: offending bytes: {}", self.id(), to_hex(rest));
                return;
            }

            self.decode_record(&rest[..SAMPLE_SIZE]);
            rest = &rest[SAMPLE_SIZE..];
        }
    }

    /// Decode a single sample record, feeding any tick to the counter.
    fn decode_record(&self, record: &[u8]) {
        let flags = LittleEndian::read_u16(&record[2..4]);
        if flags & KEEPALIVE_FLAG != 0 {
            return;
        }

        let time_us = LittleEndian::read_u32(&record[4..8]) as i64;
        let levels = LittleEndian::read_u32(&record[8..12]);

        let (pin_a, pin_b) = self.pins();
        let new_state = ((((levels >> pin_a) & 1) << 1) | ((levels >> pin_b) & 1)) as u8;
        let old_state = self.quad_state();

        match QEM[old_state as usize][new_state as usize] {
            Some(delta) if delta != 0 => self.tick(delta as i64, time_us),
            Some(_) => (),
            None => trace!(
                "Encoder {}: invalid quadrature transition {} -> {}",
                self.id(),
                old_state,
                new_state
            ),
        }

        self.set_quad_state(new_state);
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<String>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::enc_driver::Params;

    const PIN_A: u8 = 17;
    const PIN_B: u8 = 18;

    /// Build a single sample record.
    fn record(flags: u16, time_us: u32, quad_state: u8) -> Vec<u8> {
        let levels = ((quad_state as u32 >> 1) & 1) << PIN_A
            | (quad_state as u32 & 1) << PIN_B;

        let mut buf = vec![0u8; SAMPLE_SIZE];
        LittleEndian::write_u16(&mut buf[0..2], 0);
        LittleEndian::write_u16(&mut buf[2..4], flags);
        LittleEndian::write_u32(&mut buf[4..8], time_us);
        LittleEndian::write_u32(&mut buf[8..12], levels);
        buf
    }

    fn encoder() -> Encoder {
        Encoder::new(0, PIN_A, PIN_B, false, Params::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_sequence_counts_up() {
        let enc = encoder();

        let mut time = 0;
        for state in &[1u8, 3, 2, 0] {
            time += 1000;
            enc.handle_chunk(&record(0, time, *state));
        }

        assert_eq!(enc.position().get(), 4);
        assert!(enc.speed().get() > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backward_sequence_counts_down() {
        let enc = encoder();

        let mut time = 0;
        for state in &[2u8, 3, 1, 0] {
            time += 1000;
            enc.handle_chunk(&record(0, time, *state));
        }

        assert_eq!(enc.position().get(), -4);
        assert!(enc.speed().get() < 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_sample_is_ignored() {
        let enc = encoder();

        enc.handle_chunk(&record(0, 1000, 1));
        // Keepalive carries state 0, which would be a backwards step
        enc.handle_chunk(&record(KEEPALIVE_FLAG, 2000, 0));
        enc.handle_chunk(&record(0, 3000, 3));

        assert_eq!(enc.position().get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_packed_samples_decode_recursively() {
        let enc = encoder();

        let mut chunk = record(0, 1000, 1);
        chunk.extend(record(0, 2000, 3));
        chunk.extend(record(0, 3000, 2));
        enc.handle_chunk(&chunk);

        assert_eq!(enc.position().get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_chunk_is_abandoned() {
        let enc = encoder();

        let mut chunk = record(0, 1000, 1);
        // Second record is cut short
        chunk.extend(&record(0, 2000, 3)[..6]);
        enc.handle_chunk(&chunk);

        assert_eq!(enc.position().get(), 1);

        // The next chunk is processed normally
        enc.handle_chunk(&record(0, 3000, 3));
        assert_eq!(enc.position().get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_step_produces_no_tick() {
        let enc = encoder();

        enc.handle_chunk(&record(0, 1000, 3));
        assert_eq!(enc.position().get(), 0);

        // State is still tracked, so decoding resumes from 3
        enc.handle_chunk(&record(0, 2000, 2));
        assert_eq!(enc.position().get(), 1);
    }
}
