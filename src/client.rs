use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use itertools::Itertools;
use tracing::info;

use crate::entities::{Discussion, DiscussionId, Tag, TagId};
use crate::error::ConfabError;
use crate::storage::{DbOperation, Storage};

pub struct ConfabClient<S: Storage> {
    storage: S,
    discussion_map: DashMap<DiscussionId, Discussion>,
    tag_map: DashMap<TagId, Tag>,
    tag_name_index: DashMap<String, TagId>,
    tag_relations: DashMap<TagId, HashSet<DiscussionId>>,
    date_index: DashMap<NaiveDate, HashSet<DiscussionId>>,
    next_discussion_id: DiscussionId,
    next_tag_id: TagId,
}

impl<S: Storage> ConfabClient<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            discussion_map: DashMap::new(),
            tag_map: DashMap::new(),
            tag_name_index: DashMap::new(),
            tag_relations: DashMap::new(),
            date_index: DashMap::new(),
            next_discussion_id: 1,
            next_tag_id: 1,
        }
    }

    pub async fn init(&mut self) -> Result<(), ConfabError> {
        info!("Starting DB import from WAL...");
        let operations = self.storage.read_all().await?;
        for operation in operations {
            match operation {
                DbOperation::CreateTag { tag } => { self.insert_tag_no_wal(tag); }
                DbOperation::CreateDiscussion { discussion } => { self.insert_discussion_no_wal(discussion); }
                DbOperation::UpdateDiscussion { discussion } => { self.apply_update_no_wal(discussion); }
                DbOperation::DeleteDiscussion { discussion_id } => { self.remove_discussion_no_wal(&discussion_id); }
            }
        }
        info!("DB Imported!");
        Ok(())
    }

    pub fn get_discussion_count(&self) -> usize {
        self.discussion_map.len()
    }

    pub fn get_discussion_by_id(&self, discussion_id: &DiscussionId) -> Option<Discussion> {
        let maybe_discussion = self.discussion_map.get(discussion_id).map(|x| x.value().clone());
        maybe_discussion
    }

    pub fn get_tag_by_id(&self, tag_id: &TagId) -> Option<Tag> {
        let maybe_tag = self.tag_map.get(tag_id).map(|x| x.value().clone());
        maybe_tag
    }

    pub fn find_tag_by_name(&self, name: &str) -> Option<Tag> {
        let tag_id = self.tag_name_index.get(name).map(|x| *x.value())?;
        self.get_tag_by_id(&tag_id)
    }

    // mutators append to the WAL first; a failed append leaves the maps untouched
    pub async fn create_tag(&mut self, name: &str) -> Result<Tag, ConfabError> {
        let tag = Tag { id: self.next_tag_id, name: name.to_string() };
        self.write_wal(DbOperation::CreateTag { tag: tag.clone() }).await?;
        self.insert_tag_no_wal(tag.clone());
        Ok(tag)
    }

    pub async fn create_discussion(
        &mut self,
        text: String,
        created_on: NaiveDateTime,
        tag_ids: Vec<TagId>,
    ) -> Result<Discussion, ConfabError> {
        let discussion = Discussion::new(self.next_discussion_id, text, created_on, tag_ids);
        self.write_wal(DbOperation::CreateDiscussion { discussion: discussion.clone() }).await?;
        self.insert_discussion_no_wal(discussion.clone());
        Ok(discussion)
    }

    pub async fn update_discussion(
        &mut self,
        discussion_id: DiscussionId,
        text: String,
        created_on: NaiveDateTime,
        tag_ids: Vec<TagId>,
    ) -> Result<Option<Discussion>, ConfabError> {
        if self.get_discussion_by_id(&discussion_id).is_none() {
            return Ok(None);
        }
        let updated = Discussion::new(discussion_id, text, created_on, tag_ids);
        self.write_wal(DbOperation::UpdateDiscussion { discussion: updated.clone() }).await?;
        Ok(self.apply_update_no_wal(updated))
    }

    // removes the row and its tag links; the tag rows themselves stay behind
    pub async fn delete_discussion(&mut self, discussion_id: &DiscussionId) -> Result<Option<Discussion>, ConfabError> {
        if self.get_discussion_by_id(discussion_id).is_none() {
            return Ok(None);
        }
        self.write_wal(DbOperation::DeleteDiscussion { discussion_id: *discussion_id }).await?;
        Ok(self.remove_discussion_no_wal(discussion_id))
    }

    pub fn search_by_text(&self, search_text: &str) -> Vec<Discussion> {
        let discussion_vec = self.discussion_map.iter()
            .filter(|x| x.value().text.contains(search_text))
            .map(|x| x.value().clone())
            .collect::<Vec<Discussion>>();
        Self::order_most_recent_first(discussion_vec)
    }

    // both bounds are inclusive
    pub fn search_by_date_range(&self, start_date: NaiveDate, end_date: NaiveDate) -> Vec<Discussion> {
        let mut discussion_ids = HashSet::new();
        for entry in self.date_index.iter() {
            let date = *entry.key();
            if date >= start_date && date <= end_date {
                discussion_ids.extend(entry.value().iter().copied());
            }
        }
        self.collect_ordered(discussion_ids)
    }

    pub fn search_by_tags(&self, tag_names: &[String]) -> Vec<Discussion> {
        // tag_relations contains discussion_ids for each tag
        // we want the union of discussion_ids over all requested names,
        // so a discussion labelled by several of them still appears once
        let mut discussion_ids = HashSet::new();
        for name in tag_names {
            let maybe_tag_id = self.tag_name_index.get(name).map(|x| *x.value());
            if let Some(tag_id) = maybe_tag_id {
                if let Some(ids) = self.tag_relations.get(&tag_id) {
                    discussion_ids.extend(ids.value().iter().copied());
                }
            }
        }
        self.collect_ordered(discussion_ids)
    }

    fn collect_ordered(&self, discussion_ids: HashSet<DiscussionId>) -> Vec<Discussion> {
        let discussion_vec = discussion_ids.iter()
            .filter_map(|id| self.get_discussion_by_id(id))
            .collect::<Vec<Discussion>>();
        Self::order_most_recent_first(discussion_vec)
    }

    fn order_most_recent_first(discussion_vec: Vec<Discussion>) -> Vec<Discussion> {
        discussion_vec.into_iter()
            .sorted_by_key(|x| (x.created_on, x.id))
            .rev()
            .collect()
    }

    async fn write_wal(&mut self, operation: DbOperation) -> Result<(), ConfabError> {
        info!("Writing to WAL: {:?}", &operation);
        self.storage.write(operation).await?;
        info!("WAL written!");
        Ok(())
    }

    fn insert_tag_no_wal(&mut self, tag: Tag) {
        self.next_tag_id = self.next_tag_id.max(tag.id + 1);
        // first row wins on duplicate names
        self.tag_name_index.entry(tag.name.clone()).or_insert(tag.id);
        self.tag_map.insert(tag.id, tag);
    }

    fn insert_discussion_no_wal(&mut self, discussion: Discussion) {
        self.next_discussion_id = self.next_discussion_id.max(discussion.id + 1);
        self.date_index.entry(discussion.created_on_date).or_default().value_mut().insert(discussion.id);
        for tag_id in &discussion.tag_ids {
            self.tag_relations.entry(*tag_id).or_default().value_mut().insert(discussion.id);
        }
        self.discussion_map.insert(discussion.id, discussion);
    }

    fn apply_update_no_wal(&mut self, discussion: Discussion) -> Option<Discussion> {
        self.remove_discussion_no_wal(&discussion.id)?;
        self.insert_discussion_no_wal(discussion.clone());
        Some(discussion)
    }

    fn remove_discussion_no_wal(&mut self, discussion_id: &DiscussionId) -> Option<Discussion> {
        let (_, discussion) = self.discussion_map.remove(discussion_id)?;
        if let Some(mut ids) = self.date_index.get_mut(&discussion.created_on_date) {
            ids.value_mut().remove(discussion_id);
        }
        self.date_index.remove_if(&discussion.created_on_date, |_, ids| ids.is_empty());
        for tag_id in &discussion.tag_ids {
            if let Some(mut ids) = self.tag_relations.get_mut(tag_id) {
                ids.value_mut().remove(discussion_id);
            }
            self.tag_relations.remove_if(tag_id, |_, ids| ids.is_empty());
        }
        Some(discussion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, InMemoryStorage};

    fn client() -> ConfabClient<InMemoryStorage> {
        ConfabClient::new(InMemoryStorage::default())
    }

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    fn date(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_and_derives_the_date_column() {
        let mut client = client();
        let first = client.create_discussion("one".to_string(), ts(2024, 3, 5, 9, 30, 0), vec![]).await.unwrap();
        let second = client.create_discussion("two".to_string(), ts(2024, 3, 6, 9, 30, 0), vec![]).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.created_on_date, date(2024, 3, 5));
        assert_eq!(client.get_discussion_count(), 2);
    }

    #[tokio::test]
    async fn deleted_ids_are_never_handed_out_again() {
        let mut client = client();
        let first = client.create_discussion("one".to_string(), ts(2024, 3, 5, 9, 30, 0), vec![]).await.unwrap();
        client.delete_discussion(&first.id).await.unwrap();
        let second = client.create_discussion("two".to_string(), ts(2024, 3, 6, 9, 30, 0), vec![]).await.unwrap();
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn tag_name_lookup_is_exact_and_case_sensitive() {
        let mut client = client();
        let tag = client.create_tag("Rust").await.unwrap();
        assert_eq!(client.find_tag_by_name("Rust").unwrap().id, tag.id);
        assert!(client.find_tag_by_name("rust").is_none());
        assert!(client.find_tag_by_name("Rus").is_none());
    }

    #[tokio::test]
    async fn text_search_matches_substrings_most_recent_first() {
        let mut client = client();
        let foobar = client.create_discussion("foobar".to_string(), ts(2024, 1, 1, 8, 0, 0), vec![]).await.unwrap();
        let barfoo = client.create_discussion("barfoo".to_string(), ts(2024, 1, 2, 8, 0, 0), vec![]).await.unwrap();
        client.create_discussion("baz".to_string(), ts(2024, 1, 3, 8, 0, 0), vec![]).await.unwrap();

        let found_ids = client.search_by_text("foo").iter().map(|x| x.id).collect::<Vec<_>>();
        assert_eq!(found_ids, vec![barfoo.id, foobar.id]);
    }

    #[tokio::test]
    async fn text_search_breaks_timestamp_ties_by_newest_id() {
        let mut client = client();
        let same_moment = ts(2024, 1, 1, 8, 0, 0);
        let first = client.create_discussion("alpha".to_string(), same_moment, vec![]).await.unwrap();
        let second = client.create_discussion("alpha again".to_string(), same_moment, vec![]).await.unwrap();

        let found_ids = client.search_by_text("alpha").iter().map(|x| x.id).collect::<Vec<_>>();
        assert_eq!(found_ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn date_search_includes_both_bounds() {
        let mut client = client();
        let tenth = client.create_discussion("a".to_string(), ts(2024, 4, 10, 0, 0, 0), vec![]).await.unwrap();
        let eleventh = client.create_discussion("b".to_string(), ts(2024, 4, 11, 23, 59, 59), vec![]).await.unwrap();
        client.create_discussion("c".to_string(), ts(2024, 4, 12, 12, 0, 0), vec![]).await.unwrap();

        let found_ids = client.search_by_date_range(date(2024, 4, 10), date(2024, 4, 11))
            .iter().map(|x| x.id).collect::<Vec<_>>();
        assert_eq!(found_ids, vec![eleventh.id, tenth.id]);

        let narrow = client.search_by_date_range(date(2024, 4, 11), date(2024, 4, 11));
        assert_eq!(narrow.len(), 1);
        assert_eq!(narrow[0].id, eleventh.id);
    }

    #[tokio::test]
    async fn date_search_follows_a_moved_timestamp() {
        let mut client = client();
        let discussion = client.create_discussion("movable".to_string(), ts(2024, 4, 10, 9, 0, 0), vec![]).await.unwrap();
        client.update_discussion(discussion.id, "movable".to_string(), ts(2024, 5, 20, 9, 0, 0), vec![]).await.unwrap();

        assert!(client.search_by_date_range(date(2024, 4, 10), date(2024, 4, 10)).is_empty());
        let found = client.search_by_date_range(date(2024, 5, 20), date(2024, 5, 20));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].created_on_date, date(2024, 5, 20));
    }

    #[tokio::test]
    async fn tag_search_unions_without_duplicates() {
        let mut client = client();
        let x = client.create_tag("x").await.unwrap();
        let y = client.create_tag("y").await.unwrap();
        let only_x = client.create_discussion("d1".to_string(), ts(2024, 1, 1, 0, 0, 0), vec![x.id]).await.unwrap();
        let only_y = client.create_discussion("d2".to_string(), ts(2024, 1, 2, 0, 0, 0), vec![y.id]).await.unwrap();
        let both = client.create_discussion("d3".to_string(), ts(2024, 1, 3, 0, 0, 0), vec![x.id, y.id]).await.unwrap();

        let found_ids = client.search_by_tags(&["x".to_string(), "y".to_string()])
            .iter().map(|x| x.id).collect::<Vec<_>>();
        assert_eq!(found_ids, vec![both.id, only_y.id, only_x.id]);
    }

    #[tokio::test]
    async fn tag_search_skips_names_without_a_tag_row() {
        let mut client = client();
        let x = client.create_tag("x").await.unwrap();
        let tagged = client.create_discussion("d1".to_string(), ts(2024, 1, 1, 0, 0, 0), vec![x.id]).await.unwrap();

        let found = client.search_by_tags(&["x".to_string(), "missing".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, tagged.id);
        assert!(client.search_by_tags(&["missing".to_string()]).is_empty());
    }

    #[tokio::test]
    async fn deleting_a_discussion_keeps_its_tags_as_orphans() {
        let mut client = client();
        let tag = client.create_tag("keepme").await.unwrap();
        let discussion = client.create_discussion("doomed".to_string(), ts(2024, 1, 1, 0, 0, 0), vec![tag.id]).await.unwrap();

        let deleted = client.delete_discussion(&discussion.id).await.unwrap();
        assert_eq!(deleted.unwrap().id, discussion.id);
        assert!(client.get_discussion_by_id(&discussion.id).is_none());
        assert!(client.search_by_tags(&["keepme".to_string()]).is_empty());
        assert_eq!(client.find_tag_by_name("keepme").unwrap().id, tag.id);
    }

    #[tokio::test]
    async fn emptied_date_and_tag_buckets_are_dropped() {
        let mut client = client();
        let tag = client.create_tag("solo").await.unwrap();
        let discussion = client.create_discussion("only".to_string(), ts(2024, 6, 1, 8, 0, 0), vec![tag.id]).await.unwrap();
        assert_eq!(client.date_index.len(), 1);
        assert_eq!(client.tag_relations.len(), 1);

        let moved = client
            .update_discussion(discussion.id, "only".to_string(), ts(2024, 6, 2, 8, 0, 0), vec![tag.id])
            .await.unwrap().unwrap();
        assert_eq!(client.date_index.len(), 1);
        assert!(client.date_index.contains_key(&date(2024, 6, 2)));

        client.delete_discussion(&moved.id).await.unwrap();
        assert!(client.date_index.is_empty());
        assert!(client.tag_relations.is_empty());
        assert_eq!(client.find_tag_by_name("solo").unwrap().id, tag.id);
    }

    #[tokio::test]
    async fn update_replaces_the_tag_set() {
        let mut client = client();
        let a = client.create_tag("a").await.unwrap();
        let b = client.create_tag("b").await.unwrap();
        let discussion = client.create_discussion("retag me".to_string(), ts(2024, 1, 1, 0, 0, 0), vec![a.id]).await.unwrap();

        let updated = client
            .update_discussion(discussion.id, "retag me".to_string(), ts(2024, 1, 1, 0, 0, 0), vec![b.id])
            .await.unwrap().unwrap();
        assert_eq!(updated.tag_ids, vec![b.id]);
        assert!(client.search_by_tags(&["a".to_string()]).is_empty());
        assert_eq!(client.search_by_tags(&["b".to_string()]).len(), 1);
    }

    #[tokio::test]
    async fn update_of_a_missing_id_changes_nothing() {
        let mut client = client();
        let result = client.update_discussion(42, "ghost".to_string(), ts(2024, 1, 1, 0, 0, 0), vec![]).await.unwrap();
        assert!(result.is_none());
        assert_eq!(client.get_discussion_count(), 0);
    }

    #[tokio::test]
    async fn a_failed_wal_append_leaves_no_visible_state() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let db_path = tmp_dir.path().join("confab.db.json");
        std::fs::write(&db_path, "").unwrap();
        let mut client = ConfabClient::new(FileStorage::new(db_path.clone()));
        client.init().await.unwrap();
        let kept = client.create_discussion("kept".to_string(), ts(2024, 1, 1, 8, 0, 0), vec![]).await.unwrap();

        // appends reopen the db file on every call, so this fails them all
        std::fs::remove_file(&db_path).unwrap();

        let create = client.create_discussion("lost".to_string(), ts(2024, 1, 2, 8, 0, 0), vec![]).await;
        assert!(create.is_err());
        assert_eq!(client.get_discussion_count(), 1);
        assert!(client.get_discussion_by_id(&2).is_none());

        assert!(client.create_tag("lost").await.is_err());
        assert!(client.find_tag_by_name("lost").is_none());

        let update = client.update_discussion(kept.id, "changed".to_string(), ts(2024, 1, 3, 8, 0, 0), vec![]).await;
        assert!(update.is_err());
        assert_eq!(client.get_discussion_by_id(&kept.id).unwrap().text, "kept");

        let delete = client.delete_discussion(&kept.id).await;
        assert!(delete.is_err());
        assert!(client.get_discussion_by_id(&kept.id).is_some());
    }

    #[tokio::test]
    async fn replay_rebuilds_rows_indexes_and_id_counters() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let db_path = tmp_dir.path().join("confab.db.json");
        std::fs::write(&db_path, "").unwrap();

        {
            let mut client = ConfabClient::new(FileStorage::new(db_path.clone()));
            client.init().await.unwrap();
            let rust = client.create_tag("rust").await.unwrap();
            let first = client.create_discussion("first".to_string(), ts(2024, 2, 1, 10, 0, 0), vec![rust.id]).await.unwrap();
            let second = client.create_discussion("second".to_string(), ts(2024, 2, 2, 10, 0, 0), vec![]).await.unwrap();
            client.update_discussion(first.id, "first, revised".to_string(), ts(2024, 2, 3, 10, 0, 0), vec![]).await.unwrap();
            client.delete_discussion(&second.id).await.unwrap();
        }

        let mut client = ConfabClient::new(FileStorage::new(db_path));
        client.init().await.unwrap();

        assert_eq!(client.get_discussion_count(), 1);
        let revised = client.get_discussion_by_id(&1).unwrap();
        assert_eq!(revised.text, "first, revised");
        assert_eq!(revised.created_on_date, date(2024, 2, 3));
        assert!(revised.tag_ids.is_empty());
        assert!(client.search_by_tags(&["rust".to_string()]).is_empty());
        assert_eq!(client.find_tag_by_name("rust").unwrap().id, 1);

        let third = client.create_discussion("third".to_string(), ts(2024, 2, 4, 10, 0, 0), vec![]).await.unwrap();
        assert_eq!(third.id, 3);
    }
}
