use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bytes::BufMut;

use crate::authenticator::{Authenticator, Op};
use crate::cipher::Cipher;
use crate::error::{CryptoError, CryptoResult};
use crate::id::Id;
use crate::key_exchange::KeyExchange;
use crate::keys::{AsymmetricKey, Params, SymmetricKey};
use crate::mac::Mac;
use crate::secure_memory::SecureBytes;
use crate::serializable::{self, ObjectHeader, TYPE_KEY_RING};
use crate::suite::CipherSuite;

/// A hierarchical collection of keys and parameters for one cipher suite.
///
/// A ring holds categorized key collections (key-exchange and
/// authenticator params and keys, active and retired cipher keys, MAC
/// keys), a master cipher key it uses to protect its own persisted form,
/// and child rings. Lookups resolve locally first, then descend into
/// sub-rings in id order when asked to.
///
/// Derived objects ([`Cipher`], [`Mac`], [`Authenticator`],
/// [`KeyExchange`]) are built lazily and memoized; a cached object always
/// lives in the same ring as its backing key, so caches never span the
/// parent/child boundary and are simply rebuilt after [`KeyRing::load`].
///
/// A ring is a single-writer structure: two disjoint rings may be used
/// from separate threads, but one ring must not be mutated concurrently.
pub struct KeyRing {
    id: Id,
    name: String,
    description: String,
    cipher_suite: CipherSuite,
    master_cipher_key: Arc<SymmetricKey>,
    key_exchange_params: BTreeMap<Id, Arc<Params>>,
    key_exchange_keys: BTreeMap<Id, Arc<AsymmetricKey>>,
    authenticator_params: BTreeMap<Id, Arc<Params>>,
    authenticator_keys: BTreeMap<Id, Arc<AsymmetricKey>>,
    active_cipher_keys: BTreeMap<Id, Arc<SymmetricKey>>,
    retired_cipher_keys: BTreeMap<Id, Arc<SymmetricKey>>,
    mac_keys: BTreeMap<Id, Arc<AsymmetricKey>>,
    subrings: BTreeMap<Id, KeyRing>,
    cipher_cache: BTreeMap<Id, Arc<Cipher>>,
    authenticator_cache: BTreeMap<(Op, Id), Arc<Authenticator>>,
    mac_cache: BTreeMap<Id, Arc<Mac>>,
    key_exchange_cache: BTreeMap<Id, Arc<KeyExchange>>,
}

impl KeyRing {
    /// Create a ring for the given suite.
    ///
    /// When no master key is supplied, a fresh random key of the suite
    /// cipher's length is generated; a supplied key must fit the suite.
    pub fn new(
        cipher_suite: CipherSuite,
        master_cipher_key: Option<Arc<SymmetricKey>>,
        name: &str,
        description: &str,
    ) -> CryptoResult<Self> {
        let master_cipher_key = match master_cipher_key {
            Some(key) => {
                if !cipher_suite.verify_cipher_key(&key) {
                    return Err(CryptoError::invalid_argument(
                        "master_cipher_key",
                        "key does not fit the suite cipher",
                    ));
                }
                key
            }
            None => Arc::new(SymmetricKey::from_random(
                cipher_suite.cipher.key_length(),
                "master",
                "",
            )?),
        };
        Ok(Self {
            id: Id::random(),
            name: name.to_string(),
            description: description.to_string(),
            cipher_suite,
            master_cipher_key,
            key_exchange_params: BTreeMap::new(),
            key_exchange_keys: BTreeMap::new(),
            authenticator_params: BTreeMap::new(),
            authenticator_keys: BTreeMap::new(),
            active_cipher_keys: BTreeMap::new(),
            retired_cipher_keys: BTreeMap::new(),
            mac_keys: BTreeMap::new(),
            subrings: BTreeMap::new(),
            cipher_cache: BTreeMap::new(),
            authenticator_cache: BTreeMap::new(),
            mac_cache: BTreeMap::new(),
            key_exchange_cache: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The suite every object in this ring must fit.
    pub fn cipher_suite(&self) -> &CipherSuite {
        &self.cipher_suite
    }

    /// The key protecting this ring's persisted form. Never absent.
    pub fn master_cipher_key(&self) -> &Arc<SymmetricKey> {
        &self.master_cipher_key
    }

    // ---------------------------------------------------------------
    // persistence

    /// Read a ring from a file previously written with [`KeyRing::save`].
    ///
    /// With a cipher, the file contents are one unframed envelope and
    /// `associated_data` must match what was passed to `save`. A decode
    /// failure leaves no partially constructed ring behind.
    pub fn load(
        path: &Path,
        cipher: Option<&Cipher>,
        associated_data: &[u8],
    ) -> CryptoResult<Self> {
        let raw = std::fs::read(path)?;
        let plaintext = match cipher {
            Some(cipher) => cipher.decrypt_secure(&raw, associated_data)?,
            None => SecureBytes::from(raw),
        };
        let mut reader = plaintext.as_bytes();
        let ring = Self::decode(&mut reader)?;
        if !reader.is_empty() {
            return Err(CryptoError::serialization_failure(
                "trailing bytes after key ring",
            ));
        }
        Ok(ring)
    }

    /// Write this ring to a file, truncating any previous contents.
    ///
    /// With a cipher, the serialized ring is wrapped in one unframed
    /// envelope under that cipher's key.
    pub fn save(
        &self,
        path: &Path,
        cipher: Option<&Cipher>,
        associated_data: &[u8],
    ) -> CryptoResult<()> {
        let mut plaintext = Vec::new();
        self.encode(&mut plaintext);
        let mut plaintext = SecureBytes::from(plaintext);
        let contents = match cipher {
            Some(cipher) => cipher.encrypt(plaintext.as_bytes(), associated_data)?,
            None => plaintext.as_bytes().to_vec(),
        };
        plaintext.clear();
        std::fs::write(path, contents)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // key exchange params

    /// Look up key-exchange params by id.
    pub fn get_key_exchange_params(&self, params_id: &Id, recursive: bool) -> Option<Arc<Params>> {
        if let Some(params) = self.key_exchange_params.get(params_id) {
            return Some(params.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(params) = subring.get_key_exchange_params(params_id, true) {
                    return Some(params);
                }
            }
        }
        None
    }

    /// First key-exchange params matching the predicate.
    pub fn get_key_exchange_params_by(
        &self,
        predicate: &dyn Fn(&Params) -> bool,
        recursive: bool,
    ) -> Option<Arc<Params>> {
        if let Some(params) = self.key_exchange_params.values().find(|p| predicate(p)) {
            return Some(params.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(params) = subring.get_key_exchange_params_by(predicate, true) {
                    return Some(params);
                }
            }
        }
        None
    }

    /// Add key-exchange params.
    ///
    /// Returns `Ok(false)` when params with this id are already present.
    pub fn add_key_exchange_params(&mut self, params: Arc<Params>) -> CryptoResult<bool> {
        if !self.cipher_suite.verify_key_exchange_params(&params) {
            return Err(CryptoError::invalid_argument(
                "params",
                "params do not fit the suite key exchange",
            ));
        }
        Ok(insert_unique(&mut self.key_exchange_params, params.id().clone(), params))
    }

    /// Drop key-exchange params by id.
    pub fn drop_key_exchange_params(&mut self, params_id: &Id, recursive: bool) -> bool {
        if self.key_exchange_params.remove(params_id).is_some() {
            return true;
        }
        recursive
            && self
                .subrings
                .values_mut()
                .any(|subring| subring.drop_key_exchange_params(params_id, true))
    }

    /// Drop all key-exchange params.
    pub fn drop_all_key_exchange_params(&mut self, recursive: bool) {
        self.key_exchange_params.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_key_exchange_params(true);
            }
        }
    }

    // ---------------------------------------------------------------
    // key exchange keys

    /// Look up a key-exchange key by id.
    pub fn get_key_exchange_key(&self, key_id: &Id, recursive: bool) -> Option<Arc<AsymmetricKey>> {
        if let Some(key) = self.key_exchange_keys.get(key_id) {
            return Some(key.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_key_exchange_key(key_id, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    /// First key-exchange key matching the predicate.
    pub fn get_key_exchange_key_by(
        &self,
        predicate: &dyn Fn(&AsymmetricKey) -> bool,
        recursive: bool,
    ) -> Option<Arc<AsymmetricKey>> {
        if let Some(key) = self.key_exchange_keys.values().find(|k| predicate(k)) {
            return Some(key.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_key_exchange_key_by(predicate, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    /// Lazily build (and cache) the [`KeyExchange`] for a key-exchange key
    /// held by this ring or, when `recursive`, a sub-ring.
    pub fn get_key_exchange(
        &mut self,
        key_id: &Id,
        recursive: bool,
    ) -> CryptoResult<Option<Arc<KeyExchange>>> {
        if let Some(kx) = self.key_exchange_cache.get(key_id) {
            return Ok(Some(kx.clone()));
        }
        if let Some(key) = self.key_exchange_keys.get(key_id) {
            let kx = Arc::new(self.cipher_suite.get_key_exchange(key.clone())?);
            self.key_exchange_cache.insert(key_id.clone(), kx.clone());
            return Ok(Some(kx));
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if let Some(kx) = subring.get_key_exchange(key_id, true)? {
                    return Ok(Some(kx));
                }
            }
        }
        Ok(None)
    }

    /// Add a key-exchange key.
    pub fn add_key_exchange_key(&mut self, key: Arc<AsymmetricKey>) -> CryptoResult<bool> {
        if !self.cipher_suite.verify_key_exchange_key(&key) {
            return Err(CryptoError::invalid_argument(
                "key",
                "key does not fit the suite key exchange",
            ));
        }
        Ok(insert_unique(&mut self.key_exchange_keys, key.id().clone(), key))
    }

    /// Drop a key-exchange key and its cached exchange object.
    pub fn drop_key_exchange_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.key_exchange_keys.remove(key_id).is_some() {
            self.key_exchange_cache.remove(key_id);
            return true;
        }
        recursive
            && self
                .subrings
                .values_mut()
                .any(|subring| subring.drop_key_exchange_key(key_id, true))
    }

    /// Drop all key-exchange keys.
    pub fn drop_all_key_exchange_keys(&mut self, recursive: bool) {
        self.key_exchange_keys.clear();
        self.key_exchange_cache.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_key_exchange_keys(true);
            }
        }
    }

    // ---------------------------------------------------------------
    // authenticator params

    /// Look up authenticator params by id.
    pub fn get_authenticator_params(&self, params_id: &Id, recursive: bool) -> Option<Arc<Params>> {
        if let Some(params) = self.authenticator_params.get(params_id) {
            return Some(params.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(params) = subring.get_authenticator_params(params_id, true) {
                    return Some(params);
                }
            }
        }
        None
    }

    /// First authenticator params matching the predicate.
    pub fn get_authenticator_params_by(
        &self,
        predicate: &dyn Fn(&Params) -> bool,
        recursive: bool,
    ) -> Option<Arc<Params>> {
        if let Some(params) = self.authenticator_params.values().find(|p| predicate(p)) {
            return Some(params.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(params) = subring.get_authenticator_params_by(predicate, true) {
                    return Some(params);
                }
            }
        }
        None
    }

    /// Add authenticator params.
    pub fn add_authenticator_params(&mut self, params: Arc<Params>) -> CryptoResult<bool> {
        if !self.cipher_suite.verify_authenticator_params(&params) {
            return Err(CryptoError::invalid_argument(
                "params",
                "params do not fit the suite authenticator",
            ));
        }
        Ok(insert_unique(&mut self.authenticator_params, params.id().clone(), params))
    }

    /// Drop authenticator params by id.
    pub fn drop_authenticator_params(&mut self, params_id: &Id, recursive: bool) -> bool {
        if self.authenticator_params.remove(params_id).is_some() {
            return true;
        }
        recursive
            && self
                .subrings
                .values_mut()
                .any(|subring| subring.drop_authenticator_params(params_id, true))
    }

    /// Drop all authenticator params.
    pub fn drop_all_authenticator_params(&mut self, recursive: bool) {
        self.authenticator_params.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_authenticator_params(true);
            }
        }
    }

    // ---------------------------------------------------------------
    // authenticator keys

    /// Look up an authenticator key by id.
    pub fn get_authenticator_key(&self, key_id: &Id, recursive: bool) -> Option<Arc<AsymmetricKey>> {
        if let Some(key) = self.authenticator_keys.get(key_id) {
            return Some(key.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_authenticator_key(key_id, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    /// First authenticator key matching the predicate.
    pub fn get_authenticator_key_by(
        &self,
        predicate: &dyn Fn(&AsymmetricKey) -> bool,
        recursive: bool,
    ) -> Option<Arc<AsymmetricKey>> {
        if let Some(key) = self.authenticator_keys.values().find(|k| predicate(k)) {
            return Some(key.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_authenticator_key_by(predicate, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    /// Lazily build (and cache) the [`Authenticator`] for the given
    /// operation and key id.
    pub fn get_authenticator(
        &mut self,
        op: Op,
        key_id: &Id,
        recursive: bool,
    ) -> CryptoResult<Option<Arc<Authenticator>>> {
        let cache_key = (op, key_id.clone());
        if let Some(authenticator) = self.authenticator_cache.get(&cache_key) {
            return Ok(Some(authenticator.clone()));
        }
        if let Some(key) = self.authenticator_keys.get(key_id) {
            let authenticator =
                Arc::new(self.cipher_suite.get_authenticator(op, key.clone())?);
            self.authenticator_cache.insert(cache_key, authenticator.clone());
            return Ok(Some(authenticator));
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if let Some(authenticator) = subring.get_authenticator(op, key_id, true)? {
                    return Ok(Some(authenticator));
                }
            }
        }
        Ok(None)
    }

    /// Add an authenticator key.
    pub fn add_authenticator_key(&mut self, key: Arc<AsymmetricKey>) -> CryptoResult<bool> {
        if !self.cipher_suite.verify_authenticator_key(&key) {
            return Err(CryptoError::invalid_argument(
                "key",
                "key does not fit the suite authenticator",
            ));
        }
        Ok(insert_unique(&mut self.authenticator_keys, key.id().clone(), key))
    }

    /// Drop an authenticator key and its cached authenticators.
    pub fn drop_authenticator_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.authenticator_keys.remove(key_id).is_some() {
            self.authenticator_cache.remove(&(Op::Sign, key_id.clone()));
            self.authenticator_cache.remove(&(Op::Verify, key_id.clone()));
            return true;
        }
        recursive
            && self
                .subrings
                .values_mut()
                .any(|subring| subring.drop_authenticator_key(key_id, true))
    }

    /// Drop all authenticator keys.
    pub fn drop_all_authenticator_keys(&mut self, recursive: bool) {
        self.authenticator_keys.clear();
        self.authenticator_cache.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_authenticator_keys(true);
            }
        }
    }

    // ---------------------------------------------------------------
    // cipher keys

    /// Look up a cipher key by id among the master, active, and retired
    /// keys, in that order.
    pub fn get_cipher_key(&self, key_id: &Id, recursive: bool) -> Option<Arc<SymmetricKey>> {
        if self.master_cipher_key.id() == key_id {
            return Some(self.master_cipher_key.clone());
        }
        if let Some(key) = self.active_cipher_keys.get(key_id) {
            return Some(key.clone());
        }
        if let Some(key) = self.retired_cipher_keys.get(key_id) {
            return Some(key.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_cipher_key(key_id, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    /// First cipher key matching the predicate (master, active, then
    /// retired).
    pub fn get_cipher_key_by(
        &self,
        predicate: &dyn Fn(&SymmetricKey) -> bool,
        recursive: bool,
    ) -> Option<Arc<SymmetricKey>> {
        if predicate(&self.master_cipher_key) {
            return Some(self.master_cipher_key.clone());
        }
        if let Some(key) = self.active_cipher_keys.values().find(|k| predicate(k)) {
            return Some(key.clone());
        }
        if let Some(key) = self.retired_cipher_keys.values().find(|k| predicate(k)) {
            return Some(key.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_cipher_key_by(predicate, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    /// Lazily build (and cache) the [`Cipher`] for a cipher key held by
    /// this ring or, when `recursive`, a sub-ring.
    ///
    /// A cache entry always belongs to the ring that also holds the key:
    /// the local lookup never recurses, and only a local miss descends.
    pub fn get_cipher(&mut self, key_id: &Id, recursive: bool) -> CryptoResult<Option<Arc<Cipher>>> {
        if let Some(cipher) = self.cipher_cache.get(key_id) {
            return Ok(Some(cipher.clone()));
        }
        if let Some(key) = self.get_cipher_key(key_id, false) {
            let cipher = Arc::new(self.cipher_suite.get_cipher(key)?);
            self.cipher_cache.insert(key_id.clone(), cipher.clone());
            return Ok(Some(cipher));
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if let Some(cipher) = subring.get_cipher(key_id, true)? {
                    return Ok(Some(cipher));
                }
            }
        }
        Ok(None)
    }

    /// Add an active cipher key.
    ///
    /// Returns `Ok(false)` when a key with this id is already active.
    pub fn add_cipher_active_key(&mut self, key: Arc<SymmetricKey>) -> CryptoResult<bool> {
        if !self.cipher_suite.verify_cipher_key(&key) {
            return Err(CryptoError::invalid_argument(
                "key",
                "key does not fit the suite cipher",
            ));
        }
        Ok(insert_unique(&mut self.active_cipher_keys, key.id().clone(), key))
    }

    /// Move a key from active to retired. One-way: retired keys only ever
    /// decrypt historical ciphertexts and are never promoted back.
    ///
    /// The derived-cipher cache entry survives retirement, because the
    /// cipher is still needed for decryption.
    pub fn retire_active_cipher_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if let Some(key) = self.active_cipher_keys.remove(key_id) {
            self.retired_cipher_keys.insert(key_id.clone(), key);
            return true;
        }
        recursive
            && self
                .subrings
                .values_mut()
                .any(|subring| subring.retire_active_cipher_key(key_id, true))
    }

    /// Replace the master cipher key.
    ///
    /// Purges only the *old* master's derived-cipher cache entry; no other
    /// state is revalidated or regenerated (nothing in the ring derives
    /// from the master key).
    pub fn set_master_cipher_key(&mut self, key: Arc<SymmetricKey>) -> CryptoResult<()> {
        if !self.cipher_suite.verify_cipher_key(&key) {
            return Err(CryptoError::invalid_argument(
                "key",
                "key does not fit the suite cipher",
            ));
        }
        let old_id = self.master_cipher_key.id().clone();
        self.cipher_cache.remove(&old_id);
        self.master_cipher_key = key;
        Ok(())
    }

    /// Drop an active cipher key and its cached cipher.
    pub fn drop_active_cipher_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.active_cipher_keys.remove(key_id).is_some() {
            self.cipher_cache.remove(key_id);
            return true;
        }
        recursive
            && self
                .subrings
                .values_mut()
                .any(|subring| subring.drop_active_cipher_key(key_id, true))
    }

    /// Drop a retired cipher key and its cached cipher.
    pub fn drop_retired_cipher_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.retired_cipher_keys.remove(key_id).is_some() {
            self.cipher_cache.remove(key_id);
            return true;
        }
        recursive
            && self
                .subrings
                .values_mut()
                .any(|subring| subring.drop_retired_cipher_key(key_id, true))
    }

    /// Drop all active and retired cipher keys and their cached ciphers.
    pub fn drop_all_cipher_keys(&mut self, recursive: bool) {
        let master_id = self.master_cipher_key.id().clone();
        self.active_cipher_keys.clear();
        self.retired_cipher_keys.clear();
        // The master's cached cipher survives; it backs save/load.
        let master_cipher = self.cipher_cache.remove(&master_id);
        self.cipher_cache.clear();
        if let Some(cipher) = master_cipher {
            self.cipher_cache.insert(master_id, cipher);
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_cipher_keys(true);
            }
        }
    }

    // ---------------------------------------------------------------
    // mac keys

    /// Look up a MAC key by id.
    pub fn get_mac_key(&self, key_id: &Id, recursive: bool) -> Option<Arc<AsymmetricKey>> {
        if let Some(key) = self.mac_keys.get(key_id) {
            return Some(key.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_mac_key(key_id, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    /// First MAC key matching the predicate.
    pub fn get_mac_key_by(
        &self,
        predicate: &dyn Fn(&AsymmetricKey) -> bool,
        recursive: bool,
    ) -> Option<Arc<AsymmetricKey>> {
        if let Some(key) = self.mac_keys.values().find(|k| predicate(k)) {
            return Some(key.clone());
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_mac_key_by(predicate, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    /// Lazily build (and cache) the [`Mac`] for a MAC key held by this
    /// ring or, when `recursive`, a sub-ring.
    pub fn get_mac(&mut self, key_id: &Id, recursive: bool) -> CryptoResult<Option<Arc<Mac>>> {
        if let Some(mac) = self.mac_cache.get(key_id) {
            return Ok(Some(mac.clone()));
        }
        if let Some(key) = self.mac_keys.get(key_id) {
            let mac = Arc::new(self.cipher_suite.get_mac(key.clone())?);
            self.mac_cache.insert(key_id.clone(), mac.clone());
            return Ok(Some(mac));
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if let Some(mac) = subring.get_mac(key_id, true)? {
                    return Ok(Some(mac));
                }
            }
        }
        Ok(None)
    }

    /// Add a MAC key.
    pub fn add_mac_key(&mut self, key: Arc<AsymmetricKey>) -> CryptoResult<bool> {
        if !self.cipher_suite.verify_mac_key(&key) {
            return Err(CryptoError::invalid_argument(
                "key",
                "key is not an HMAC or CMAC secret",
            ));
        }
        Ok(insert_unique(&mut self.mac_keys, key.id().clone(), key))
    }

    /// Drop a MAC key and its cached MAC.
    pub fn drop_mac_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.mac_keys.remove(key_id).is_some() {
            self.mac_cache.remove(key_id);
            return true;
        }
        recursive
            && self
                .subrings
                .values_mut()
                .any(|subring| subring.drop_mac_key(key_id, true))
    }

    /// Drop all MAC keys.
    pub fn drop_all_mac_keys(&mut self, recursive: bool) {
        self.mac_keys.clear();
        self.mac_cache.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_mac_keys(true);
            }
        }
    }

    // ---------------------------------------------------------------
    // sub-rings

    /// Look up a sub-ring by id.
    pub fn get_subring(&self, subring_id: &Id, recursive: bool) -> Option<&KeyRing> {
        if let Some(subring) = self.subrings.get(subring_id) {
            return Some(subring);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(found) = subring.get_subring(subring_id, true) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Mutable sub-ring lookup by id.
    pub fn get_subring_mut(&mut self, subring_id: &Id, recursive: bool) -> Option<&mut KeyRing> {
        if self.subrings.contains_key(subring_id) {
            return self.subrings.get_mut(subring_id);
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if let Some(found) = subring.get_subring_mut(subring_id, true) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// First sub-ring matching the predicate.
    pub fn get_subring_by(
        &self,
        predicate: &dyn Fn(&KeyRing) -> bool,
        recursive: bool,
    ) -> Option<&KeyRing> {
        if let Some(subring) = self.subrings.values().find(|r| predicate(r)) {
            return Some(subring);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(found) = subring.get_subring_by(predicate, true) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Attach a sub-ring. The ring takes ownership; the structure stays a
    /// tree, so a ring can never reach itself through sub-ring traversal.
    pub fn add_subring(&mut self, subring: KeyRing) -> CryptoResult<bool> {
        if subring.id == self.id {
            return Err(CryptoError::invalid_argument(
                "subring",
                "a ring cannot contain itself",
            ));
        }
        Ok(insert_unique(&mut self.subrings, subring.id.clone(), subring))
    }

    /// Detach a sub-ring, without recursing into the detached subtree.
    pub fn drop_subring(&mut self, subring_id: &Id, recursive: bool) -> bool {
        if self.subrings.remove(subring_id).is_some() {
            return true;
        }
        recursive
            && self
                .subrings
                .values_mut()
                .any(|subring| subring.drop_subring(subring_id, true))
    }

    /// Detach all immediate sub-rings (non-recursive).
    pub fn drop_all_subrings(&mut self) {
        self.subrings.clear();
    }

    /// Drop every collection and cache on this ring only. The master key
    /// is retained.
    pub fn clear(&mut self) {
        self.key_exchange_params.clear();
        self.key_exchange_keys.clear();
        self.authenticator_params.clear();
        self.authenticator_keys.clear();
        self.active_cipher_keys.clear();
        self.retired_cipher_keys.clear();
        self.mac_keys.clear();
        self.subrings.clear();
        self.cipher_cache.clear();
        self.authenticator_cache.clear();
        self.mac_cache.clear();
        self.key_exchange_cache.clear();
    }

    // ---------------------------------------------------------------
    // wire form

    fn header(&self) -> ObjectHeader {
        ObjectHeader::new(TYPE_KEY_RING, self.id.clone(), &self.name, &self.description)
    }

    /// Serialize this ring (recursively). Derived caches are not part of
    /// the wire form; they rebuild lazily after [`KeyRing::load`].
    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.header().encode(buf);
        serializable::put_string(buf, &self.cipher_suite.to_string());
        buf.put_u32(self.key_exchange_params.len() as u32);
        for params in self.key_exchange_params.values() {
            params.encode(buf);
        }
        buf.put_u32(self.key_exchange_keys.len() as u32);
        for key in self.key_exchange_keys.values() {
            key.encode(buf);
        }
        buf.put_u32(self.authenticator_params.len() as u32);
        for params in self.authenticator_params.values() {
            params.encode(buf);
        }
        buf.put_u32(self.authenticator_keys.len() as u32);
        for key in self.authenticator_keys.values() {
            key.encode(buf);
        }
        self.master_cipher_key.encode(buf);
        buf.put_u32(self.active_cipher_keys.len() as u32);
        for key in self.active_cipher_keys.values() {
            key.encode(buf);
        }
        buf.put_u32(self.retired_cipher_keys.len() as u32);
        for key in self.retired_cipher_keys.values() {
            key.encode(buf);
        }
        buf.put_u32(self.mac_keys.len() as u32);
        for key in self.mac_keys.values() {
            key.encode(buf);
        }
        buf.put_u32(self.subrings.len() as u32);
        for subring in self.subrings.values() {
            subring.encode(buf);
        }
    }

    /// Decode a ring (recursively), verifying category membership against
    /// the decoded suite and rejecting duplicate ids.
    pub fn decode(buf: &mut &[u8]) -> CryptoResult<Self> {
        let header = ObjectHeader::decode(buf, TYPE_KEY_RING)?;
        let cipher_suite: CipherSuite = serializable::get_string(buf)?.parse()?;

        let mut key_exchange_params = BTreeMap::new();
        for _ in 0..serializable::get_u32(buf)? {
            let params = Arc::new(Params::decode(buf)?);
            decode_insert(&mut key_exchange_params, params.id().clone(), params)?;
        }
        let mut key_exchange_keys = BTreeMap::new();
        for _ in 0..serializable::get_u32(buf)? {
            let key = Arc::new(AsymmetricKey::decode(buf)?);
            decode_insert(&mut key_exchange_keys, key.id().clone(), key)?;
        }
        let mut authenticator_params = BTreeMap::new();
        for _ in 0..serializable::get_u32(buf)? {
            let params = Arc::new(Params::decode(buf)?);
            decode_insert(&mut authenticator_params, params.id().clone(), params)?;
        }
        let mut authenticator_keys = BTreeMap::new();
        for _ in 0..serializable::get_u32(buf)? {
            let key = Arc::new(AsymmetricKey::decode(buf)?);
            decode_insert(&mut authenticator_keys, key.id().clone(), key)?;
        }
        let master_cipher_key = Arc::new(SymmetricKey::decode(buf)?);
        if !cipher_suite.verify_cipher_key(&master_cipher_key) {
            return Err(CryptoError::serialization_failure(
                "master cipher key does not fit the suite cipher",
            ));
        }
        let mut active_cipher_keys = BTreeMap::new();
        for _ in 0..serializable::get_u32(buf)? {
            let key = Arc::new(SymmetricKey::decode(buf)?);
            decode_insert(&mut active_cipher_keys, key.id().clone(), key)?;
        }
        let mut retired_cipher_keys = BTreeMap::new();
        for _ in 0..serializable::get_u32(buf)? {
            let key = Arc::new(SymmetricKey::decode(buf)?);
            decode_insert(&mut retired_cipher_keys, key.id().clone(), key)?;
        }
        let mut mac_keys = BTreeMap::new();
        for _ in 0..serializable::get_u32(buf)? {
            let key = Arc::new(AsymmetricKey::decode(buf)?);
            decode_insert(&mut mac_keys, key.id().clone(), key)?;
        }
        let mut subrings = BTreeMap::new();
        for _ in 0..serializable::get_u32(buf)? {
            let subring = KeyRing::decode(buf)?;
            decode_insert(&mut subrings, subring.id.clone(), subring)?;
        }

        Ok(Self {
            id: header.id,
            name: header.name,
            description: header.description,
            cipher_suite,
            master_cipher_key,
            key_exchange_params,
            key_exchange_keys,
            authenticator_params,
            authenticator_keys,
            active_cipher_keys,
            retired_cipher_keys,
            mac_keys,
            subrings,
            cipher_cache: BTreeMap::new(),
            authenticator_cache: BTreeMap::new(),
            mac_cache: BTreeMap::new(),
            key_exchange_cache: BTreeMap::new(),
        })
    }
}

/// Insert rejecting duplicates; `false` means an entry with this id was
/// already present.
fn insert_unique<V>(map: &mut BTreeMap<Id, V>, id: Id, value: V) -> bool {
    use std::collections::btree_map::Entry;
    match map.entry(id) {
        Entry::Occupied(_) => false,
        Entry::Vacant(entry) => {
            entry.insert(value);
            true
        }
    }
}

fn decode_insert<V>(map: &mut BTreeMap<Id, V>, id: Id, value: V) -> CryptoResult<()> {
    if !insert_unique(map, id.clone(), value) {
        return Err(CryptoError::DuplicateId { id });
    }
    Ok(())
}

/// Structural equality: suite, master key, every collection, and
/// sub-rings (recursively). Derived caches are transient and excluded.
impl PartialEq for KeyRing {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.cipher_suite == other.cipher_suite
            && *self.master_cipher_key == *other.master_cipher_key
            && map_eq(&self.key_exchange_params, &other.key_exchange_params)
            && map_eq(&self.key_exchange_keys, &other.key_exchange_keys)
            && map_eq(&self.authenticator_params, &other.authenticator_params)
            && map_eq(&self.authenticator_keys, &other.authenticator_keys)
            && map_eq(&self.active_cipher_keys, &other.active_cipher_keys)
            && map_eq(&self.retired_cipher_keys, &other.retired_cipher_keys)
            && map_eq(&self.mac_keys, &other.mac_keys)
            && self.subrings == other.subrings
    }
}

impl Eq for KeyRing {}

fn map_eq<V: PartialEq>(a: &BTreeMap<Id, Arc<V>>, b: &BTreeMap<Id, Arc<V>>) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((ida, va), (idb, vb))| ida == idb && **va == **vb)
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cipher_suite", &self.cipher_suite.to_string())
            .field("active_cipher_keys", &self.active_cipher_keys.len())
            .field("retired_cipher_keys", &self.retired_cipher_keys.len())
            .field("subrings", &self.subrings.len())
            .finish_non_exhaustive()
    }
}
