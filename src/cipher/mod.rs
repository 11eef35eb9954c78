/*!
 * Authenticated Symmetric Encryption
 *
 * This module implements the ciphertext envelope: a self-describing byte
 * layout binding an IV, ciphertext, MAC tag and (in the framed form) the
 * encrypting key's id. AEAD modes carry their tag inside the ciphertext;
 * the CBC modes append an external HMAC computed over `iv || ciphertext`.
 */

mod cipher;

pub use cipher::*;
