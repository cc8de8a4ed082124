use super::*;
use time::OffsetDateTime;
use time::macros::datetime;

fn bm(id: &str, at: OffsetDateTime) -> Bookmark {
    Bookmark { id: id.into(), owner: "u1".into(), title: format!("t-{id}"), url: format!("https://{id}.example"), created_at: at }
}

fn ids(list: &BookmarkList) -> Vec<&str> {
    list.as_slice().iter().map(|b| b.id.as_str()).collect()
}

#[test]
fn replace_sorts_newest_first_and_dedupes() {
    let mut list = BookmarkList::new();
    list.replace(
        vec![
            bm("a", datetime!(2025-01-01 0:00 UTC)),
            bm("c", datetime!(2025-01-03 0:00 UTC)),
            bm("b", datetime!(2025-01-02 0:00 UTC)),
            bm("c", datetime!(2025-01-03 0:00 UTC)),
        ],
        &HashSet::new(),
    );
    assert_eq!(ids(&list), vec!["c", "b", "a"]);
}

#[test]
fn replace_drops_withheld_and_buried_ids() {
    let mut list = BookmarkList::new();
    list.insert(bm("gone", datetime!(2025-01-01 0:00 UTC)));
    list.bury("gone");

    let withheld: HashSet<&str> = ["held"].into_iter().collect();
    list.replace(
        vec![
            bm("gone", datetime!(2025-01-01 0:00 UTC)),
            bm("held", datetime!(2025-01-02 0:00 UTC)),
            bm("kept", datetime!(2025-01-03 0:00 UTC)),
        ],
        &withheld,
    );
    assert_eq!(ids(&list), vec!["kept"]);
}

#[test]
fn insert_keeps_created_at_order() {
    let mut list = BookmarkList::new();
    assert!(list.insert(bm("mid", datetime!(2025-01-02 0:00 UTC))));
    assert!(list.insert(bm("new", datetime!(2025-01-03 0:00 UTC))));
    assert!(list.insert(bm("old", datetime!(2025-01-01 0:00 UTC))));
    assert_eq!(ids(&list), vec!["new", "mid", "old"]);
}

#[test]
fn insert_tie_goes_ahead_of_existing() {
    let at = datetime!(2025-01-01 12:00 UTC);
    let mut list = BookmarkList::new();
    list.insert(bm("first", at));
    list.insert(bm("second", at));
    assert_eq!(ids(&list), vec!["second", "first"]);
}

#[test]
fn insert_rejects_duplicate_id() {
    let mut list = BookmarkList::new();
    assert!(list.insert(bm("a", datetime!(2025-01-01 0:00 UTC))));
    let rev = list.revision();
    assert!(!list.insert(bm("a", datetime!(2025-02-01 0:00 UTC))));
    assert_eq!(list.as_slice().len(), 1);
    assert_eq!(list.revision(), rev);
}

#[test]
fn buried_id_is_never_readmitted() {
    let mut list = BookmarkList::new();
    list.insert(bm("a", datetime!(2025-01-01 0:00 UTC)));
    assert!(list.bury("a").is_some());
    assert!(!list.insert(bm("a", datetime!(2025-01-01 0:00 UTC))));
    assert!(list.as_slice().is_empty());
}

#[test]
fn bury_of_absent_id_still_tombstones() {
    let mut list = BookmarkList::new();
    assert!(list.bury("never-seen").is_none());
    assert!(!list.insert(bm("never-seen", datetime!(2025-01-01 0:00 UTC))));
}

#[test]
fn remove_allows_reinsert() {
    let mut list = BookmarkList::new();
    let original = bm("a", datetime!(2025-01-01 0:00 UTC));
    list.insert(original.clone());
    let removed = list.remove("a").unwrap();
    assert_eq!(removed, original);
    assert!(list.insert(removed));
    assert!(list.contains("a"));
}

#[test]
fn revision_moves_only_on_change() {
    let mut list = BookmarkList::new();
    assert_eq!(list.revision(), 0);
    list.insert(bm("a", datetime!(2025-01-01 0:00 UTC)));
    assert_eq!(list.revision(), 1);
    assert!(list.remove("missing").is_none());
    assert_eq!(list.revision(), 1);
    list.remove("a");
    assert_eq!(list.revision(), 2);
}
