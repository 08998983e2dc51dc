/// file: src/feeds/mod.rs
/// description: Feature feeds built on `TopicFeed`
pub mod bid;
pub mod home;
pub mod my_auctions;
pub mod my_bids;
pub mod notifications;
pub mod rankings;

pub use bid::BidFeed;
pub use home::HomeFeed;
pub use my_auctions::MyAuctionsFeed;
pub use my_bids::MyBidsFeed;
pub use notifications::NotificationsFeed;
pub use rankings::RankingsFeed;

/// Updates the entry whose id matches in place, or prepends a new one.
/// Returns true when an entry was inserted.
pub(crate) fn upsert<T>(
    entries: &mut Vec<T>,
    id: i64,
    id_of: impl Fn(&T) -> i64,
    create: impl FnOnce() -> T,
    update: impl FnOnce(&mut T),
) -> bool {
    match entries.iter_mut().find(|entry| id_of(entry) == id) {
        Some(entry) => {
            update(entry);
            false
        }
        None => {
            let mut entry = create();
            update(&mut entry);
            entries.insert(0, entry);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::upsert;

    #[test]
    fn test_upsert_updates_in_place_or_prepends() {
        let mut entries = vec![(1, "a"), (2, "b")];

        let inserted = upsert(&mut entries, 2, |e| e.0, || (2, ""), |e| e.1 = "B");
        assert!(!inserted);
        assert_eq!(entries, vec![(1, "a"), (2, "B")]);

        let inserted = upsert(&mut entries, 3, |e| e.0, || (3, ""), |e| e.1 = "c");
        assert!(inserted);
        assert_eq!(entries, vec![(3, "c"), (1, "a"), (2, "B")]);
    }
}
