table! {
    articles (id) {
        id -> Int4,
        author_id -> Int4,
        slug -> Text,
        title -> Text,
        description -> Text,
        body -> Text,
        tag_list -> Array<Text>,
        created_at -> Timestamp,
        updated_at -> Nullable<Timestamp>,
    }
}

table! {
    comments (id) {
        id -> Int4,
        article_id -> Int4,
        author_id -> Int4,
        body -> Text,
        created_at -> Timestamp,
    }
}

table! {
    favorites (id) {
        id -> Int4,
        article_id -> Int4,
        user_id -> Int4,
    }
}

// One row per unordered user pair, canonicalized so user_lo < user_hi. The
// unique index on (user_lo, user_hi) is what turns the friend-request
// transitions into single conditional writes.
table! {
    friend_edges (id) {
        id -> Int4,
        user_lo -> Int4,
        user_hi -> Int4,
        requester_id -> Int4,
        accepted -> Bool,
        created_at -> Timestamp,
    }
}

table! {
    users (id) {
        id -> Int4,
        username -> Varchar,
        password -> Text,
        email -> Text,
        bio -> Nullable<Text>,
        image -> Nullable<Text>,
    }
}

joinable!(articles -> users (author_id));
joinable!(comments -> articles (article_id));
joinable!(comments -> users (author_id));
joinable!(favorites -> articles (article_id));
joinable!(favorites -> users (user_id));

allow_tables_to_appear_in_same_query!(articles, comments, favorites, friend_edges, users,);
