//! Frame encryption and decryption.
//!
//! Every frame on the wire is `0x10 | u32be(len) | ciphertext`, where the
//! ciphertext is AES-256-CBC over PKCS#7-padded JSON. The key and IV are the
//! same for every device of the vendor; they provide compatibility, not
//! confidentiality.

use crate::error::{Result, SoundbarError};
use crate::frame::{FRAME_MARKER, HEADER_LEN};
use crate::protocol::Response;
use aes::Aes256;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// AES block size; ciphertext lengths are multiples of it
pub const BLOCK_SIZE: usize = 16;

const KEY: [u8; 32] = *b"T^&*J%^7tr~4^%^&I(o%^!jIJ__+a0 k";
const IV: [u8; 16] = *b"'%^Ur7gy$~t+f)%@";

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

/// Serialize, pad, encrypt and frame a message.
///
/// # Example
///
/// ```
/// use lgsoundbar::{codec, Command, MessageKind};
///
/// let frame = codec::encode(&Command::get(MessageKind::Play)).unwrap();
/// assert_eq!(frame[0], 0x10);
/// assert_eq!((frame.len() - 5) % 16, 0);
/// ```
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    let plaintext = serde_json::to_vec(message)?;
    let ciphertext = Encryptor::new(&KEY.into(), &IV.into()).encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

    let len = u32::try_from(ciphertext.len())
        .map_err(|_| SoundbarError::Encrypt(format!("payload of {} bytes is too large", ciphertext.len())))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    frame.push(FRAME_MARKER);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Decrypt a frame payload and parse the response it carries
pub fn decode(ciphertext: &[u8]) -> Result<Response> {
    decode_as(ciphertext)
}

/// Decrypt a frame payload into any message type
pub fn decode_as<T: DeserializeOwned>(ciphertext: &[u8]) -> Result<T> {
    let plaintext = decrypt(ciphertext)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

/// Decrypt and strip the trailing pad bytes.
///
/// The pad count is the value of the last byte; only that byte is checked,
/// matching what the firmware emits.
pub(crate) fn decrypt(ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(SoundbarError::Framing(ciphertext.len()));
    }

    let mut plaintext = Decryptor::new(&KEY.into(), &IV.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| SoundbarError::Framing(ciphertext.len()))?;

    let pad = plaintext[plaintext.len() - 1];
    if pad == 0 || pad as usize > BLOCK_SIZE {
        return Err(SoundbarError::Padding(pad));
    }
    plaintext.truncate(plaintext.len() - pad as usize);
    Ok(plaintext)
}

#[cfg(test)]
fn encrypt_unpadded(plaintext: &[u8]) -> Vec<u8> {
    Encryptor::new(&KEY.into(), &IV.into())
        .encrypt_padded_vec_mut::<NoPadding>(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, MessageKind};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn frame_header_carries_ciphertext_length() {
        let frame = encode(&Command::set_volume(7)).unwrap();
        assert_eq!(frame[0], FRAME_MARKER);
        let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        assert_eq!(frame.len(), HEADER_LEN + len);
        assert_eq!(len % BLOCK_SIZE, 0);
    }

    #[test]
    fn decode_recovers_tag_and_data() {
        let frame = encode(&Command::set_mute(true)).unwrap();
        let response = decode(&frame[HEADER_LEN..]).unwrap();
        assert_eq!(response.msg, "SPK_LIST_VIEW_INFO");
        assert_eq!(response.data().get("b_mute"), Some(&json!(true)));
    }

    #[test]
    fn pad_is_always_between_one_and_sixteen_bytes() {
        // {"cmd":"get","msg":"PLAY_INFO"} is 31 bytes, so one pad byte
        let frame = encode(&Command::get(MessageKind::Play)).unwrap();
        assert_eq!(frame.len() - HEADER_LEN, 32);

        let mut padded = vec![b'x'; 16];
        padded.extend_from_slice(&[16u8; 16]);
        assert_eq!(decrypt(&encrypt_unpadded(&padded)).unwrap(), vec![b'x'; 16]);
    }

    #[test]
    fn empty_buffer_is_framing_error() {
        assert!(matches!(decode(&[]), Err(SoundbarError::Framing(0))));
    }

    #[test]
    fn garbage_plaintext_is_parse_error() {
        let mut padded = b"not json at all".to_vec();
        padded.push(1);
        let err = decode(&encrypt_unpadded(&padded)).unwrap_err();
        assert!(matches!(err, SoundbarError::Parse(_)));
    }

    proptest! {
        #[test]
        fn commands_survive_the_wire(volume in -1i32..=100, name in "\\PC{0,64}") {
            for command in [Command::set_volume(volume), Command::set(MessageKind::Settings, "s_user_name", name.clone())] {
                let frame = encode(&command).unwrap();
                let decoded: Command = decode_as(&frame[HEADER_LEN..]).unwrap();
                prop_assert_eq!(decoded, command);
            }
        }

        #[test]
        fn unaligned_length_is_framing_error(len in 1usize..512) {
            prop_assume!(len % BLOCK_SIZE != 0);
            let buf = vec![0xAAu8; len];
            prop_assert!(matches!(decode(&buf), Err(SoundbarError::Framing(n)) if n == len));
        }

        #[test]
        fn bad_pad_byte_is_padding_error(
            body in proptest::collection::vec(any::<u8>(), 15),
            pad in prop_oneof![Just(0u8), 17u8..=255],
        ) {
            let mut block = body;
            block.push(pad);
            let err = decrypt(&encrypt_unpadded(&block)).unwrap_err();
            prop_assert!(matches!(err, SoundbarError::Padding(p) if p == pad));
        }
    }
}
