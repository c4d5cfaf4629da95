//! Name override store port (interface).

use std::collections::BTreeSet;

use crate::error::Result;

/// Port for the local name-resolution override table.
///
/// Every entry maps a name to a sinkhole address denoting this host, which
/// preempts normal DNS resolution for that name.
pub trait NameOverrideStore: Send + Sync {
    /// Names currently pointed at a sinkhole address.
    fn list_sinkholed_names(
        &self,
    ) -> impl std::future::Future<Output = Result<BTreeSet<String>>> + Send;

    /// Sinkhole every name in `domains`.
    ///
    /// Names must already be validated.
    fn append_sinkhole_entries(
        &self,
        domains: &[String],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Remove all sinkhole entries for `domain`, returning how many went.
    fn remove_entries_matching(
        &self,
        domain: &str,
    ) -> impl std::future::Future<Output = Result<usize>> + Send;
}
