//! Maple packet model: frame word codec, payload storage, checksum.

use heapless::Vec;

/// Most payload words a single packet may carry.
pub const MAX_PAYLOAD_WORDS: usize = 255;

/// Payload storage for one packet.
pub type Payload = Vec<u32, MAX_PAYLOAD_WORDS>;

/// XOR of every byte of the given words.
///
/// The Maple checksum is byte-wise, but XOR is associative, so the words can
/// be folded first and the resulting word condensed to a byte afterwards.
pub fn crc8(words: &[u32]) -> u8 {
    let folded = words.iter().fold(0u32, |acc, w| acc ^ w);
    crc8_word(folded)
}

/// XOR of the four bytes of one word.
pub fn crc8_word(word: u32) -> u8 {
    let b = word.to_be_bytes();
    b[0] ^ b[1] ^ b[2] ^ b[3]
}

/// The 4-byte header preceding a packet's payload.
///
/// On the wire the four bytes travel most significant first:
/// command, recipient, sender, length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    /// Command or response opcode.
    pub command: u8,
    /// Address of the peripheral this packet targets.
    pub recipient_addr: u8,
    /// Address of the endpoint sending this packet.
    pub sender_addr: u8,
    /// Number of payload words that follow the frame word.
    pub length: u8,
}

impl Frame {
    /// Unpack a frame from its 32-bit wire word.
    pub fn from_word(word: u32) -> Self {
        Self {
            command: (word >> 24) as u8,
            recipient_addr: (word >> 16) as u8,
            sender_addr: (word >> 8) as u8,
            length: word as u8,
        }
    }

    /// Pack the frame into its 32-bit wire word.
    pub fn to_word(self) -> u32 {
        (u32::from(self.command) << 24)
            | (u32::from(self.recipient_addr) << 16)
            | (u32::from(self.sender_addr) << 8)
            | u32::from(self.length)
    }
}

/// One Maple packet: frame header plus up to 255 payload words.
///
/// A packet is built by a client and not modified afterwards, with one
/// exception: the host node may normalize sender and recipient addresses
/// while popping it for delivery (single-sender shortcut).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MaplePacket {
    /// Frame header.
    pub frame: Frame,
    /// Payload words, in transmission order.
    pub payload: Payload,
}

impl MaplePacket {
    /// Build a packet from an explicit frame and payload.
    ///
    /// The frame's length field is taken verbatim; see [`MaplePacket::is_valid`].
    pub fn new(frame: Frame, payload: Payload) -> Self {
        Self { frame, payload }
    }

    /// Build a packet whose length field matches the payload.
    ///
    /// Returns `None` when the payload exceeds [`MAX_PAYLOAD_WORDS`].
    pub fn from_payload(command: u8, recipient_addr: u8, sender_addr: u8, words: &[u32]) -> Option<Self> {
        let payload = Payload::from_slice(words).ok()?;
        Some(Self {
            frame: Frame {
                command,
                recipient_addr,
                sender_addr,
                length: payload.len() as u8,
            },
            payload,
        })
    }

    /// Parse a raw received word buffer: word 0 is the frame word, the rest
    /// is payload. The frame's length field is authoritative for the payload
    /// size, capped at the number of words actually present.
    pub fn from_words(words: &[u32]) -> Self {
        let mut packet = Self::default();
        packet.set(words);
        packet
    }

    /// Re-parse this packet from a raw received word buffer (see
    /// [`MaplePacket::from_words`]). An empty buffer resets the packet.
    pub fn set(&mut self, words: &[u32]) {
        self.reset();
        let Some((&frame_word, rest)) = words.split_first() else {
            return;
        };
        self.frame = Frame::from_word(frame_word);
        let take = usize::from(self.frame.length).min(rest.len());
        // Capacity covers any u8 length, so this cannot fail.
        let _ = self.payload.extend_from_slice(&rest[..take]);
    }

    /// Return to a default frame and an empty payload.
    pub fn reset(&mut self) {
        self.frame = Frame::default();
        self.payload.clear();
    }

    /// Whether the length field agrees with the payload actually held.
    pub fn is_valid(&self) -> bool {
        usize::from(self.frame.length) == self.payload.len()
    }

    /// The packed frame word.
    pub fn frame_word(&self) -> u32 {
        self.frame.to_word()
    }

    /// Bits this packet occupies on the wire: frame word, payload words, and
    /// the 8-bit checksum.
    pub fn total_bits(&self) -> u32 {
        (1 + self.payload.len() as u32) * 32 + 8
    }

    /// Checksum over the frame word and payload.
    pub fn crc(&self) -> u8 {
        self.payload
            .iter()
            .fold(crc8_word(self.frame_word()), |acc, &w| acc ^ crc8_word(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_word_packs_command_first() {
        let frame = Frame {
            command: 0x09,
            recipient_addr: 0x20,
            sender_addr: 0x00,
            length: 0x01,
        };
        assert_eq!(frame.to_word(), 0x0920_0001);
        assert_eq!(Frame::from_word(0x0920_0001), frame);
    }

    #[test]
    fn crc_is_byte_xor_of_header_and_payload() {
        // command=0x01, recipient=0x00, sender=0x00, length=0xFF with 255
        // zero payload words: 0x01 ^ 0x00 ^ 0x00 ^ 0xFF = 0xFE.
        let packet = MaplePacket::from_payload(0x01, 0x00, 0x00, &[0u32; 255]).unwrap();
        assert_eq!(packet.frame_word(), 0x0100_00FF);
        assert_eq!(packet.crc(), 0xFE);
    }

    #[test]
    fn total_bits_counts_frame_payload_and_crc() {
        let empty = MaplePacket::from_payload(0x07, 0x00, 0x20, &[]).unwrap();
        assert_eq!(empty.total_bits(), 40);
        let one = MaplePacket::from_payload(0x09, 0x20, 0x00, &[0x0100_0000]).unwrap();
        assert_eq!(one.total_bits(), 72);
    }

    #[test]
    fn validity_tracks_length_field() {
        let mut packet = MaplePacket::from_payload(0x09, 0x20, 0x00, &[1, 2, 3]).unwrap();
        assert!(packet.is_valid());
        packet.frame.length = 2;
        assert!(!packet.is_valid());
    }

    #[test]
    fn set_honors_length_field_up_to_available_words() {
        let mut packet = MaplePacket::default();
        packet.set(&[0x0520_0002, 0xAAAA_AAAA, 0xBBBB_BBBB, 0xCCCC_CCCC]);
        assert_eq!(packet.frame.length, 2);
        assert_eq!(packet.payload.as_slice(), &[0xAAAA_AAAA, 0xBBBB_BBBB]);
        assert!(packet.is_valid());

        // Length claims more than was received: take what is there.
        packet.set(&[0x0520_0005, 0x1111_1111]);
        assert_eq!(packet.payload.as_slice(), &[0x1111_1111]);
        assert!(!packet.is_valid());

        packet.set(&[]);
        assert_eq!(packet, MaplePacket::default());
    }

    #[test]
    fn from_payload_rejects_oversized_payloads() {
        let words = [0u32; 256];
        assert!(MaplePacket::from_payload(0x0C, 0x01, 0x00, &words).is_none());
    }
}
