//! Request signature calculation
//!
//! Last.fm requires an `api_sig` parameter on every signed call: the
//! MD5 hex digest of every parameter's `key` immediately followed by
//! its `value`, concatenated in alphabetical key order, with the API
//! secret appended. `api_sig` itself and the `format` parameter are
//! never part of the signature.

use std::collections::BTreeMap;

/// Compute the `api_sig` value for a parameter set.
///
/// The BTreeMap guarantees alphabetical iteration, so the signature is
/// a pure function of the (key, value) set regardless of insertion
/// order.
pub(crate) fn api_signature(params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut plain = String::new();
    for (key, value) in params {
        plain.push_str(key);
        plain.push_str(value);
    }
    plain.push_str(secret);

    format!("{:x}", md5::compute(plain.as_bytes()))
}
