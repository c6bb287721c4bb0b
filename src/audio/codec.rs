//! Opus codec wrappers for the voice path
//!
//! Thin safe wrappers around `libopus_sys`. The encoder accumulates PCM
//! until a complete Opus frame is available and hands every encoded packet
//! to a sink callback; the decoder does the reverse for inbound packets.

use crate::errors::VoiceError;

/// Maximum size of a single Opus packet.
const MAX_PACKET_BYTES: usize = 4000;

/// Largest decodable Opus frame is 120ms; at 48kHz mono that is 5760
/// samples, which also covers every lower rate.
const MAX_DECODE_SAMPLES: usize = 5760;

fn check_rate(sample_rate: u32) -> Result<(), VoiceError> {
    match sample_rate {
        8000 | 12000 | 16000 | 24000 | 48000 => Ok(()),
        other => Err(VoiceError::Encoding(format!(
            "Opus does not support {} Hz (use 8/12/16/24/48 kHz)",
            other
        ))),
    }
}

/// Mono Opus encoder for the capture path
///
/// # Thread Safety
/// The underlying `libopus` encoder is NOT thread-safe for concurrent
/// access, but IS safe to use from a single thread after being moved there.
/// The capture pipeline owns its encoder exclusively, so `Send` is enough;
/// do NOT implement `Clone` or `Sync` for this type.
pub struct VoiceEncoder {
    encoder: *mut libopus_sys::OpusEncoder,
    sample_rate: u32,
    frame_samples: usize,
    /// Samples accumulated until a full Opus frame is available
    sample_buffer: Vec<i16>,
}

// SAFETY: the raw pointer points to memory allocated by libopus, which is
// safe to use from any single thread. Sync is deliberately not implemented,
// so the encoder can never be shared across threads.
unsafe impl Send for VoiceEncoder {}

impl VoiceEncoder {
    /// Create a mono voice encoder.
    ///
    /// `frame_samples` must correspond to a legal Opus frame duration at
    /// `sample_rate` (e.g. 320 samples at 16 kHz = 20 ms).
    pub fn new(sample_rate: u32, bitrate: u32, frame_samples: usize) -> Result<Self, VoiceError> {
        check_rate(sample_rate)?;
        if frame_samples == 0 || frame_samples > MAX_DECODE_SAMPLES {
            return Err(VoiceError::Encoding(format!(
                "Invalid frame size: {} samples",
                frame_samples
            )));
        }

        let mut error: i32 = 0;
        let encoder = unsafe {
            libopus_sys::opus_encoder_create(
                sample_rate as i32,
                1,
                libopus_sys::OPUS_APPLICATION_VOIP as i32,
                &mut error,
            )
        };

        if encoder.is_null() || error != libopus_sys::OPUS_OK as i32 {
            return Err(VoiceError::Encoding(format!(
                "Failed to create Opus encoder: error code {}",
                error
            )));
        }

        let result = unsafe {
            libopus_sys::opus_encoder_ctl(
                encoder,
                libopus_sys::OPUS_SET_BITRATE_REQUEST as i32,
                bitrate as i32,
            )
        };

        if result != libopus_sys::OPUS_OK as i32 {
            unsafe { libopus_sys::opus_encoder_destroy(encoder) };
            return Err(VoiceError::Encoding(format!(
                "Failed to set bitrate: error code {}",
                result
            )));
        }

        Ok(Self {
            encoder,
            sample_rate,
            frame_samples,
            sample_buffer: Vec::with_capacity(frame_samples * 2),
        })
    }

    /// Encode filtered PCM. The sink is invoked once per encoded packet.
    ///
    /// May invoke the sink zero times when not enough samples have
    /// accumulated for a full Opus frame, or more than once when the input
    /// carries several frames worth of samples. Returns the packet count.
    pub fn encode(
        &mut self,
        pcm: &[i16],
        mut sink: impl FnMut(&[u8]),
    ) -> Result<usize, VoiceError> {
        self.sample_buffer.extend_from_slice(pcm);

        let mut packets = 0;
        let mut output = [0u8; MAX_PACKET_BYTES];

        while self.sample_buffer.len() >= self.frame_samples {
            let frame: Vec<i16> = self.sample_buffer.drain(..self.frame_samples).collect();

            let len = unsafe {
                libopus_sys::opus_encode(
                    self.encoder,
                    frame.as_ptr(),
                    self.frame_samples as i32,
                    output.as_mut_ptr(),
                    output.len() as i32,
                )
            };

            if len < 0 {
                return Err(VoiceError::Encoding(format!(
                    "Opus encoding failed: error code {}",
                    len
                )));
            }

            sink(&output[..len as usize]);
            packets += 1;
        }

        Ok(packets)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }
}

impl Drop for VoiceEncoder {
    fn drop(&mut self) {
        if !self.encoder.is_null() {
            unsafe {
                libopus_sys::opus_encoder_destroy(self.encoder);
            }
        }
    }
}

/// Mono Opus decoder for the playback path
///
/// Owned exclusively by the playback task; see the `VoiceEncoder` thread
/// safety notes.
pub struct VoiceDecoder {
    decoder: *mut libopus_sys::OpusDecoder,
    sample_rate: u32,
    pcm_buffer: Vec<i16>,
}

// SAFETY: same single-thread ownership argument as VoiceEncoder.
unsafe impl Send for VoiceDecoder {}

impl VoiceDecoder {
    pub fn new(sample_rate: u32) -> Result<Self, VoiceError> {
        check_rate(sample_rate)?;

        let mut error: i32 = 0;
        let decoder =
            unsafe { libopus_sys::opus_decoder_create(sample_rate as i32, 1, &mut error) };

        if decoder.is_null() || error != libopus_sys::OPUS_OK as i32 {
            return Err(VoiceError::Encoding(format!(
                "Failed to create Opus decoder: error code {}",
                error
            )));
        }

        Ok(Self {
            decoder,
            sample_rate,
            pcm_buffer: vec![0i16; MAX_DECODE_SAMPLES],
        })
    }

    /// Decode one inbound packet. The sink is invoked once per decoded PCM
    /// frame. Returns the number of samples produced.
    pub fn decode(
        &mut self,
        packet: &[u8],
        mut sink: impl FnMut(&[i16]),
    ) -> Result<usize, VoiceError> {
        if packet.is_empty() {
            return Err(VoiceError::Encoding("Empty Opus packet".to_string()));
        }

        let samples = unsafe {
            libopus_sys::opus_decode(
                self.decoder,
                packet.as_ptr(),
                packet.len() as i32,
                self.pcm_buffer.as_mut_ptr(),
                self.pcm_buffer.len() as i32,
                0,
            )
        };

        if samples < 0 {
            return Err(VoiceError::Encoding(format!(
                "Opus decoding failed: error code {}",
                samples
            )));
        }

        sink(&self.pcm_buffer[..samples as usize]);
        Ok(samples as usize)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for VoiceDecoder {
    fn drop(&mut self) {
        if !self.decoder.is_null() {
            unsafe {
                libopus_sys::opus_decoder_destroy(self.decoder);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_creation() {
        assert!(VoiceEncoder::new(16000, 24_000, 320).is_ok());
    }

    #[test]
    fn test_encoder_rejects_wrong_sample_rate() {
        assert!(VoiceEncoder::new(44100, 24_000, 320).is_err());
    }

    #[test]
    fn test_encoder_rejects_zero_frame() {
        assert!(VoiceEncoder::new(16000, 24_000, 0).is_err());
    }

    #[test]
    fn test_encode_full_frame_emits_one_packet() {
        let mut encoder = VoiceEncoder::new(16000, 24_000, 320).unwrap();
        let pcm = [0i16; 320];

        let mut emitted = Vec::new();
        let packets = encoder
            .encode(&pcm, |pkt| emitted.push(pkt.to_vec()))
            .unwrap();

        assert_eq!(packets, 1);
        assert_eq!(emitted.len(), 1);
        assert!(!emitted[0].is_empty());
    }

    #[test]
    fn test_encode_partial_frame_emits_nothing() {
        let mut encoder = VoiceEncoder::new(16000, 24_000, 320).unwrap();
        let pcm = [0i16; 100];

        let packets = encoder.encode(&pcm, |_| panic!("no packet expected")).unwrap();
        assert_eq!(packets, 0);
    }

    #[test]
    fn test_decoder_rejects_empty_packet() {
        let mut decoder = VoiceDecoder::new(16000).unwrap();
        assert!(decoder.decode(&[], |_| {}).is_err());
    }

    #[test]
    fn test_decode_encoded_frame() {
        let mut encoder = VoiceEncoder::new(16000, 24_000, 320).unwrap();
        let mut decoder = VoiceDecoder::new(16000).unwrap();

        let pcm = [0i16; 320];
        let mut packet = Vec::new();
        encoder.encode(&pcm, |pkt| packet = pkt.to_vec()).unwrap();

        let mut decoded = 0;
        decoder.decode(&packet, |frame| decoded = frame.len()).unwrap();
        assert_eq!(decoded, 320);
    }
}
