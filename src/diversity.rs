//! Address diversity scoring.
//!
//! The score is the Shannon entropy of the /16 groups an address set falls
//! into, normalized by `log2(|set|)`. A score near 0 means every address
//! shares one group; 1 means every address sits in its own group.

use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Numeric stand-in for [`UnsupportedAddressFormat`] when a plain `f64` is needed.
pub const REJECT_SENTINEL: f64 = -1.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported address format: '{0}'")]
pub struct UnsupportedAddressFormat(pub String);

/// Score an address set. Duplicates count once, and a set of at most one
/// address scores 0 whatever it holds. Otherwise every address must be a
/// dotted quad; anything that does not split into exactly four components
/// rejects the whole set.
pub fn diversity<I, S>(addresses: I) -> Result<f64, UnsupportedAddressFormat>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let addresses: Vec<S> = addresses.into_iter().collect();
    let unique: BTreeSet<&str> = addresses.iter().map(|a| AsRef::<str>::as_ref(a)).collect();
    if unique.len() <= 1 {
        return Ok(0.0);
    }

    let mut groups: HashMap<&str, usize> = HashMap::new();
    for &addr in &unique {
        let octets: Vec<&str> = addr.split('.').collect();
        if octets.len() != 4 {
            return Err(UnsupportedAddressFormat(addr.to_string()));
        }
        // first two octets: the /16 group
        let group_len = octets[0].len() + 1 + octets[1].len();
        *groups.entry(&addr[..group_len]).or_insert(0) += 1;
    }

    let n = unique.len() as f64;
    let entropy: f64 = groups
        .values()
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.log2()
        })
        .sum();

    Ok((entropy / n.log2()).clamp(0.0, 1.0))
}

/// Same as [`diversity`] but folds the rejection into [`REJECT_SENTINEL`].
pub fn diversity_or_sentinel<I, S>(addresses: I) -> f64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    diversity(addresses).unwrap_or(REJECT_SENTINEL)
}
