// SQLite schema definitions
// This file mirrors schema.rs but stores timestamps as fixed-width RFC 3339 text

diesel::table! {
    monitoring_tasks (id) {
        id -> BigInt,
        chat_id -> Text,
        name -> Text,
        url -> Text,
        frequency_minutes -> Integer,
        last_updated -> Text,
        last_got_item -> Nullable<Text>,
    }
}

diesel::table! {
    item_records (id) {
        id -> BigInt,
        item_url -> Text,
        source_url -> Text,
        title -> Nullable<Text>,
        price -> Nullable<Text>,
        location -> Nullable<Text>,
        created_at -> Nullable<Text>,
        created_at_pretty -> Nullable<Text>,
        image_url -> Nullable<Text>,
        description -> Nullable<Text>,
        source -> Nullable<Text>,
        first_seen -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(monitoring_tasks, item_records);
