/*!
 * Key Objects
 *
 * The three materializable key types a ring stores: [`SymmetricKey`]
 * (secret bytes with a fixed maximum length), [`AsymmetricKey`] (a
 * kind-tagged private or public key), and [`Params`] (algorithm
 * parameters sufficient to generate a key pair).
 */

mod asymmetric;
mod params;
mod symmetric;

pub use asymmetric::{AsymmetricKey, KeyKind};
pub use params::{NamedCurve, Params};
pub use symmetric::{SymmetricKey, MAX_SYMMETRIC_KEY_LENGTH};
