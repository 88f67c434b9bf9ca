use executor_graph::{custom, tag, HasTags, RuntimeError, TagMap, TagOptions, TaggedValue};

struct Component {
    tags: Vec<TaggedValue>,
}

impl HasTags for Component {
    fn tags(&self) -> &[TaggedValue] {
        &self.tags
    }
}

#[tokio::test]
async fn get_falls_back_to_the_default_when_the_source_has_no_value() {
    let priority = tag(
        custom::<i32>(),
        TagOptions {
            label: Some("priority"),
            default: Some(0),
        },
    );
    let empty = TagMap::new();

    assert_eq!(priority.get(&empty).unwrap(), 0);
    assert_eq!(priority.find(&empty), Some(0));
}

#[tokio::test]
async fn get_fails_with_not_found_when_absent_and_no_default_is_set() {
    let required = tag(custom::<i32>(), TagOptions::<i32>::default());
    let empty = TagMap::new();

    assert!(matches!(required.get(&empty), Err(RuntimeError::NotFound { .. })));
    assert_eq!(required.find(&empty), None);
}

#[tokio::test]
async fn set_in_writes_into_a_tag_map_and_get_reads_it_back() {
    let retries = tag(custom::<i32>(), TagOptions::<i32>::default());
    let mut store = TagMap::new();

    retries.set_in(&mut store, 3).unwrap();
    assert_eq!(retries.get(&store).unwrap(), 3);
}

#[tokio::test]
async fn some_returns_every_matching_value_in_source_order_from_a_tag_container() {
    let label = tag(custom::<&'static str>(), TagOptions::<&'static str>::default());
    let component = Component {
        tags: vec![
            label.set_for_append("first").unwrap(),
            label.set_for_append("second").unwrap(),
        ],
    };

    assert_eq!(label.some(&component), vec!["first", "second"]);
}

#[tokio::test]
async fn entry_seeds_a_key_value_store_with_a_validated_tagged_value() {
    let count = tag(custom::<i32>(), TagOptions::<i32>::default());
    let mut store = TagMap::new();

    let entry = count.entry(Some(9)).unwrap();
    store.insert(entry);

    assert_eq!(count.get(&store).unwrap(), 9);
}

#[tokio::test]
async fn two_tags_with_distinct_keys_do_not_see_each_others_values() {
    let a = tag(custom::<i32>(), TagOptions::<i32>::default());
    let b = tag(custom::<i32>(), TagOptions::<i32>::default());
    let mut store = TagMap::new();

    a.set_in(&mut store, 1).unwrap();

    assert_eq!(a.get(&store).unwrap(), 1);
    assert!(b.find(&store).is_none());
}
