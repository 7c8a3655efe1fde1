use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::{delete as diesel_delete, insert_into};
use rocket_contrib::json::Json;
use std::collections::HashSet;

use crate::article::Article;
use crate::db::schema::comments;
use crate::db::DbConnection;
use crate::friends;
use crate::profile::Profile;
use crate::types::{ApiError, ApiResult, ValidationError};
use crate::users::models::User;
use crate::users::CurrentUser;
use crate::utils::serialize_date;

#[derive(Debug, Queryable, Identifiable, Associations, PartialEq)]
#[belongs_to(Article)]
#[table_name = "comments"]
pub struct Comment {
    pub id: i32,
    pub article_id: i32,
    pub author_id: i32,
    pub body: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView<'r> {
    id: i32,
    #[serde(serialize_with = "serialize_date")]
    created_at: NaiveDateTime,
    body: String,
    author: Profile<'r>,
}

impl<'r> From<(Comment, Profile<'r>)> for CommentView<'r> {
    fn from((comment, profile): (Comment, Profile<'r>)) -> Self {
        CommentView {
            id: comment.id,
            author: profile,
            created_at: comment.created_at,
            body: comment.body,
        }
    }
}

#[derive(Insertable)]
#[table_name = "comments"]
pub struct NewComment {
    article_id: i32,
    author_id: i32,
    body: String,
    created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    body: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CommentContainer<T> {
    comment: T,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CommentsContainer<T> {
    comments: T,
}

#[post("/<slug_>/comments", data = "<details>", format = "application/json")]
pub fn add(
    connection: DbConnection,
    user: CurrentUser,
    slug_: String,
    details: Json<CommentContainer<CommentBody>>,
) -> ApiResult<CommentContainer<CommentView<'static>>> {
    let user = user?;
    let details = details.into_inner();
    if details.comment.body.trim().len() == 0 {
        return Err(ValidationError::from("body", "empty body").into());
    }

    let article = Article::load_by_slug(&slug_, &connection)?;
    let new_comment = NewComment {
        article_id: article.id,
        author_id: user.id,
        body: details.comment.body,
        created_at: Utc::now().naive_utc(),
    };

    let comment = insert_into(comments::table)
        .values(&new_comment)
        .get_result::<Comment>(&*connection)?;

    let profile = user.into_profile(false);
    let container = CommentContainer {
        comment: (comment, profile).into(),
    };
    Ok(Json(container))
}

#[get("/<slug_>/comments", format = "application/json")]
pub fn get(
    connection: DbConnection,
    user: Option<User>,
    slug_: String,
) -> ApiResult<CommentsContainer<Vec<CommentView<'static>>>> {
    use crate::db::schema::users;

    let article = Article::load_by_slug(&slug_, &connection)?;
    let data = Comment::belonging_to(&article)
        .inner_join(users::table.on(comments::author_id.eq(users::id)))
        .order(comments::created_at.asc())
        .load::<(Comment, User)>(&*connection)?;

    let following: HashSet<i32> = match user {
        Some(ref user) => friends::following_ids(user.id, &connection)?
            .into_iter()
            .collect(),
        None => HashSet::new(),
    };

    let comments = data
        .into_iter()
        .map(|(comment, author)| {
            let follows = following.contains(&author.id);
            (comment, author.into_profile(follows)).into()
        })
        .collect();
    Ok(Json(CommentsContainer { comments }))
}

#[delete("/<_slug>/comments/<id>", format = "application/json")]
pub fn delete(
    connection: DbConnection,
    user: CurrentUser,
    _slug: String,
    id: i32,
) -> ApiResult<CommentContainer<CommentView<'static>>> {
    let user = user?;
    let comment = comments::table
        .find(id)
        .first::<Comment>(&*connection)
        .map_err(ApiError::from)?;
    if comment.author_id != user.id {
        return Err(ApiError::Forbidden);
    }
    diesel_delete(&comment).execute(&*connection)?;

    let profile = user.into_profile(false);
    Ok(Json(CommentContainer {
        comment: (comment, profile).into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn comment_wire_shape() {
        let comment = Comment {
            id: 3,
            article_id: 7,
            author_id: 1,
            body: "nice dragons".into(),
            created_at: chrono::NaiveDate::from_ymd(2018, 4, 1).and_hms(12, 0, 0),
        };
        let author = Profile {
            username: Cow::Borrowed("bob"),
            bio: None,
            image: None,
            following: false,
        };
        let view: CommentView = (comment, author).into();
        let json = serde_json::to_value(&CommentContainer { comment: view }).unwrap();

        assert_eq!(json["comment"]["id"], 3);
        assert_eq!(json["comment"]["body"], "nice dragons");
        assert_eq!(json["comment"]["createdAt"], "2018-04-01T12:00:00.000Z");
        assert_eq!(json["comment"]["author"]["username"], "bob");
        // internal references stay off the wire
        assert!(json["comment"].get("articleId").is_none());
    }
}
