use crate::store::PortalStore;
use autoscale_cuckoo_filter::CuckooFilter;
use once_cell::sync::Lazy;
use std::sync::RwLock;

/// Expected capacity and false-positive rate.
const FILTER_CAPACITY: usize = 20_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static EMAIL_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

#[inline]
fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check if an email might be registered (false positives possible)
pub fn might_exist(email: &str) -> bool {
    let email = normalize(email);
    EMAIL_FILTER
        .read()
        .expect("email filter poisoned")
        .contains(&email)
}

pub fn insert(email: &str) {
    let email = normalize(email);
    EMAIL_FILTER
        .write()
        .expect("email filter poisoned")
        .add(&email);
}

/// true when no portal account uses `email`
pub fn is_email_available(email: &str, store: &PortalStore) -> bool {
    // fast negative
    if !might_exist(email) {
        return true;
    }
    !store.email_taken(email)
}

/// Loads every cached account's email into the filter, in batches.
///
/// Run again whenever the cache is re-hydrated.
pub fn warmup_email_filter(store: &PortalStore, batch_size: usize) -> usize {
    let emails = store.user_emails();

    for batch in emails.chunks(batch_size.max(1)) {
        let mut filter = EMAIL_FILTER.write().expect("email filter poisoned");
        for email in batch {
            if !filter.contains(email) {
                filter.add(email);
            }
        }
    }

    log::info!("Email filter warmup complete: {} accounts", emails.len());
    emails.len()
}
