use std::{
    fs::OpenOptions,
    io::{Read, Write},
    path::Path,
};

use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};
use primitives::{Digest, NodeId};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::signature::Signature;

#[derive(Error, Debug)]
pub enum KeypairError {
    #[error("failed to deserialize the secret key from bytes")]
    InvalidSecretKey,

    #[error("failed to deserialize the public key from bytes")]
    InvalidPublicKey,

    #[error("invalid hex representation of secret key")]
    InvalidHex,

    #[error("signature does not verify for {0}")]
    BadSignature(NodeId),

    #[error("failed to read key from file, details: {0}")]
    FailedToReadFromFile(String),

    #[error("failed to write key to file, details: {0}")]
    FailedToWriteToFile(String),
}

pub type Result<T> = std::result::Result<T, KeypairError>;

/// The node's Ed25519 signing identity. Signs 32-byte digests only, so
/// every signature in the system covers a hash rather than raw payloads.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the secret half
        f.debug_tuple("Keypair").field(&self.node_id()).finish()
    }
}

impl Keypair {
    /// Constructs a new, random `Keypair` using the OS RNG.
    pub fn random() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        Keypair { signing }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; SECRET_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeypairError::InvalidSecretKey)?;
        Ok(Keypair {
            signing: SigningKey::from_bytes(&bytes),
        })
    }

    /// The identity derived from this keypair's verification key.
    pub fn node_id(&self) -> NodeId {
        NodeId::from_bytes(self.signing.verifying_key().to_bytes())
    }

    pub fn sign_digest(&self, digest: &Digest) -> Signature {
        Signature::sign(&self.signing, self.node_id(), digest)
    }

    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing.to_bytes()
    }
}

/// Reads a hex-encoded secret key from a `Read` implementor.
pub fn read_keypair<R: Read>(reader: &mut R) -> Result<Keypair> {
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .map_err(|e| KeypairError::FailedToReadFromFile(e.to_string()))?;

    let bytes = hex::decode(contents.trim()).map_err(|_| KeypairError::InvalidHex)?;
    Keypair::from_secret_bytes(&bytes)
}

pub fn read_keypair_file<F: AsRef<Path>>(path: F) -> Result<Keypair> {
    let mut file = std::fs::File::open(path.as_ref())
        .map_err(|e| KeypairError::FailedToReadFromFile(e.to_string()))?;
    read_keypair(&mut file)
}

/// Writes a `Keypair` to a `Write` implementor with hex encoding.
pub fn write_keypair<W: Write>(keypair: &Keypair, writer: &mut W) -> Result<String> {
    let serialized = hex::encode(keypair.secret_bytes());
    writer
        .write_all(serialized.as_bytes())
        .map_err(|e| KeypairError::FailedToWriteToFile(e.to_string()))?;
    Ok(serialized)
}

pub fn write_keypair_file<F: AsRef<Path>>(keypair: &Keypair, outfile: F) -> Result<String> {
    let outfile = outfile.as_ref();
    if let Some(outdir) = outfile.parent() {
        std::fs::create_dir_all(outdir)
            .map_err(|e| KeypairError::FailedToWriteToFile(e.to_string()))?;
    }

    let mut file = {
        #[cfg(not(unix))]
        {
            OpenOptions::new()
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut options = OpenOptions::new();
            options.mode(0o600);
            options
        }
    }
    .write(true)
    .truncate(true)
    .create(true)
    .open(outfile)
    .map_err(|e| KeypairError::FailedToWriteToFile(e.to_string()))?;

    write_keypair(keypair, &mut file)
}
