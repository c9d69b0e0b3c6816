diesel::table! {
    monitoring_tasks (id) {
        id -> BigInt,
        chat_id -> Text,
        name -> Varchar,
        url -> Text,
        frequency_minutes -> Integer,
        last_updated -> Timestamptz,
        last_got_item -> Nullable<Timestamptz>,
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
        created_at -> Nullable<Timestamptz>,
        created_at_pretty -> Nullable<Text>,
        image_url -> Nullable<Text>,
        description -> Nullable<Text>,
        source -> Nullable<Text>,
        first_seen -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(monitoring_tasks, item_records);
