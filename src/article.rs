use chrono::{NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{delete as diesel_delete, insert_into, select, update as diesel_update};
use rocket_contrib::json::Json;
use slug::slugify;

use crate::db::schema::{articles, comments, favorites};
use crate::db::DbConnection;
use crate::friends;
use crate::profile::Profile;
use crate::types::{ApiError, ApiResult, Validate, ValidationError};
use crate::users::models::User;
use crate::users::CurrentUser;
use crate::utils::serialize_date;

#[derive(Debug, Queryable, Identifiable, Associations, AsChangeset, PartialEq)]
#[belongs_to(User, foreign_key = "author_id")]
#[table_name = "articles"]
pub struct Article {
    pub id: i32,
    pub author_id: i32,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl Article {
    pub fn load_by_slug(slug_: &str, connection: &PgConnection) -> Result<Article, ApiError> {
        use crate::db::schema::articles::dsl::*;
        articles
            .filter(slug.eq(&slug_))
            .get_result::<Article>(connection)
            .map_err(|e| e.into())
    }
}

#[derive(Insertable)]
#[table_name = "articles"]
pub struct NewArticle {
    author_id: i32,
    slug: String,
    title: String,
    description: String,
    body: String,
    tag_list: Vec<String>,
    created_at: NaiveDateTime,
    updated_at: Option<NaiveDateTime>,
}

/// Wire projection of an article: derived favorite data plus the author's
/// profile as seen by the viewer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView<'a> {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: NaiveDateTime,
    pub favorited: bool,
    pub favorites_count: i64,
    pub author: Profile<'a>,
}

impl<'a> ArticleView<'a> {
    pub fn compose(
        article: Article,
        author: Profile<'a>,
        favorites_count: i64,
        favorited: bool,
    ) -> ArticleView<'a> {
        // an article that was never edited reports its creation time
        let updated_at = article.updated_at.unwrap_or(article.created_at);
        ArticleView {
            slug: article.slug,
            title: article.title,
            description: article.description,
            body: article.body,
            tag_list: article.tag_list,
            created_at: article.created_at,
            updated_at,
            favorited,
            favorites_count,
            author,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArticleResponse<'a> {
    article: ArticleView<'a>,
}

pub fn derive_slug(title: &str) -> String {
    slugify(title)
}

/// Resolves slug collisions deterministically: the base slug if free,
/// otherwise the first free of `base-2`, `base-3`, ...
pub fn unique_slug<F>(base: &str, mut taken: F) -> Result<String, ApiError>
where
    F: FnMut(&str) -> Result<bool, ApiError>,
{
    if !taken(base)? {
        return Ok(base.to_string());
    }
    let mut n: u32 = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

fn slug_exists(candidate: &str, connection: &PgConnection) -> Result<bool, ApiError> {
    use crate::db::schema::articles::dsl::*;
    select(exists(articles.filter(slug.eq(candidate))))
        .get_result::<bool>(connection)
        .map_err(|e| e.into())
}

pub fn favorites_count(article: i32, connection: &PgConnection) -> Result<i64, ApiError> {
    use crate::db::schema::favorites::dsl::*;
    favorites
        .filter(article_id.eq(article))
        .count()
        .get_result::<i64>(connection)
        .map_err(|e| e.into())
}

pub fn is_favorited(user: i32, article: i32, connection: &PgConnection) -> Result<bool, ApiError> {
    use crate::db::schema::favorites::dsl::*;
    select(exists(
        favorites
            .filter(user_id.eq(user))
            .filter(article_id.eq(article)),
    ))
    .get_result::<bool>(connection)
    .map_err(|e| e.into())
}

/// Assembles the full single-article view for an optionally-anonymous viewer.
pub fn view_for(
    article: Article,
    viewer: Option<&User>,
    connection: &PgConnection,
) -> Result<ArticleView<'static>, ApiError> {
    use crate::db::schema::users::dsl::*;

    let author = users
        .find(article.author_id)
        .get_result::<User>(connection)?;
    let count = favorites_count(article.id, connection)?;
    let (favorited, following) = match viewer {
        Some(viewer) => (
            is_favorited(viewer.id, article.id, connection)?,
            friends::is_following(viewer.id, author.id, connection)?,
        ),
        None => (false, false),
    };
    Ok(ArticleView::compose(
        article,
        author.into_profile(following),
        count,
        favorited,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ArticleDetails {
    title: String,
    description: String,
    body: String,
    #[serde(default, rename = "tagList")]
    tag_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateArticle {
    article: ArticleDetails,
}

impl Validate for CreateArticle {
    type Error = ValidationError;
    fn validate(self, _connection: &PgConnection) -> Result<Self, ValidationError> {
        let mut error = ValidationError::default();
        if self.article.body.trim().len() == 0 {
            error.add_error("body", "empty body");
        }

        if self.article.title.trim().len() == 0 {
            error.add_error("title", "empty title");
        }

        if self.article.description.trim().len() == 0 {
            error.add_error("description", "empty description");
        }

        if error.empty() {
            Ok(self)
        } else {
            Err(error)
        }
    }
}

// The free-slug probe and the insert are not atomic; a racing creation with
// the same title surfaces as a unique violation, so recompute once.
fn insert_with_unique_slug(
    mut new_article: NewArticle,
    connection: &PgConnection,
) -> Result<Article, ApiError> {
    use crate::db::schema::articles::dsl::*;

    for _ in 0..2 {
        match insert_into(articles)
            .values(&new_article)
            .get_result::<Article>(connection)
        {
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                let base = derive_slug(&new_article.title);
                new_article.slug = unique_slug(&base, |c| slug_exists(c, connection))?;
            }
            other => return other.map_err(|e| e.into()),
        }
    }
    Err(ApiError::Internal)
}

#[post("/", format = "application/json", data = "<create>")]
pub fn create(
    connection: DbConnection,
    user: CurrentUser,
    create: Json<CreateArticle>,
) -> ApiResult<ArticleResponse<'static>> {
    let user = user?;
    let create = create.validate(&connection)?.into_inner();

    let base = derive_slug(&create.article.title);
    let free = unique_slug(&base, |c| slug_exists(c, &connection))?;
    let new_article = NewArticle {
        author_id: user.id,
        slug: free,
        title: create.article.title,
        description: create.article.description,
        body: create.article.body,
        tag_list: create.article.tag_list,
        created_at: Utc::now().naive_utc(),
        updated_at: None,
    };

    let article = insert_with_unique_slug(new_article, &connection)?;
    let author = user.into_profile(false);
    Ok(Json(ArticleResponse {
        article: ArticleView::compose(article, author, 0, false),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDetails {
    title: Option<String>,
    description: Option<String>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArticle {
    article: UpdateDetails,
}

#[put("/<slug_>", format = "application/json", data = "<update>")]
pub fn update(
    connection: DbConnection,
    current_user: CurrentUser,
    slug_: String,
    update: Json<UpdateArticle>,
) -> ApiResult<ArticleResponse<'static>> {
    let current = current_user?;
    let patch = update.into_inner().article;

    let mut article = Article::load_by_slug(&slug_, &connection)?;
    if article.author_id != current.id {
        return Err(ApiError::Forbidden);
    }

    let mut error = ValidationError::default();

    if let Some(new_title) = patch.title {
        if new_title.trim().len() == 0 {
            error.add_error("title", "empty title");
        } else if new_title != article.title {
            // the slug follows the title, re-checking collisions; the
            // article's own slug does not count as taken
            let base = derive_slug(&new_title);
            let current_slug = article.slug.clone();
            article.slug = unique_slug(&base, |c| {
                if c == current_slug {
                    Ok(false)
                } else {
                    slug_exists(c, &connection)
                }
            })?;
            article.title = new_title;
        }
    }

    if let Some(new_description) = patch.description {
        if new_description.trim().len() == 0 {
            error.add_error("description", "empty description");
        } else {
            article.description = new_description;
        }
    }

    if let Some(new_body) = patch.body {
        if new_body.trim().len() == 0 {
            error.add_error("body", "empty body");
        } else {
            article.body = new_body;
        }
    }

    if !error.empty() {
        return Err(error.into());
    }

    article.updated_at = Some(Utc::now().naive_utc());
    diesel_update(&article)
        .set(&article)
        .execute(&*connection)?;

    let view = view_for(article, Some(&current), &connection)?;
    Ok(Json(ArticleResponse { article: view }))
}

#[delete("/<slug_>", format = "application/json")]
pub fn delete(
    connection: DbConnection,
    current_user: CurrentUser,
    slug_: String,
) -> ApiResult<ArticleResponse<'static>> {
    let current = current_user?;
    let article = Article::load_by_slug(&slug_, &connection)?;
    if article.author_id != current.id {
        return Err(ApiError::Forbidden);
    }

    // comments and favorite edges go with the article, all or nothing
    connection.transaction::<_, ApiError, _>(|| {
        diesel_delete(comments::table.filter(comments::article_id.eq(article.id)))
            .execute(&*connection)?;
        diesel_delete(favorites::table.filter(favorites::article_id.eq(article.id)))
            .execute(&*connection)?;
        diesel_delete(articles::table.filter(articles::id.eq(article.id)))
            .execute(&*connection)?;
        Ok(())
    })?;

    let author = current.into_profile(false);
    Ok(Json(ArticleResponse {
        article: ArticleView::compose(article, author, 0, false),
    }))
}

#[get("/<slug_>", format = "application/json")]
pub fn get(
    connection: DbConnection,
    current_user: Option<User>,
    slug_: String,
) -> ApiResult<ArticleResponse<'static>> {
    let article = Article::load_by_slug(&slug_, &connection)?;
    let view = view_for(article, current_user.as_ref(), &connection)?;
    Ok(Json(ArticleResponse { article: view }))
}

#[post("/<slug_>/favorite", format = "application/json")]
pub fn favorite(
    connection: DbConnection,
    current_user: CurrentUser,
    slug_: String,
) -> ApiResult<ArticleResponse<'static>> {
    use crate::db::schema::favorites::dsl::*;

    let current = current_user?;
    let article = Article::load_by_slug(&slug_, &connection)?;

    // set semantics: favoriting twice is a no-op
    insert_into(favorites)
        .values((user_id.eq(current.id), article_id.eq(article.id)))
        .on_conflict((user_id, article_id))
        .do_nothing()
        .execute(&*connection)?;

    let view = view_for(article, Some(&current), &connection)?;
    Ok(Json(ArticleResponse { article: view }))
}

#[delete("/<slug_>/favorite", format = "application/json")]
pub fn unfavorite(
    connection: DbConnection,
    current_user: CurrentUser,
    slug_: String,
) -> ApiResult<ArticleResponse<'static>> {
    use crate::db::schema::favorites::dsl::*;

    let current = current_user?;
    let article = Article::load_by_slug(&slug_, &connection)?;

    // removing an edge that is not there returns current state, not an error
    diesel_delete(
        favorites
            .filter(user_id.eq(current.id))
            .filter(article_id.eq(article.id)),
    )
    .execute(&*connection)?;

    let view = view_for(article, Some(&current), &connection)?;
    Ok(Json(ArticleResponse { article: view }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::collections::HashSet;

    #[test]
    fn slug_follows_title() {
        assert_eq!(derive_slug("How to Train"), "how-to-train");
        assert_eq!(derive_slug("Hello, World!"), "hello-world");
    }

    #[test]
    fn collision_takes_first_free_suffix() {
        let taken: HashSet<&str> = ["how-to-train", "how-to-train-2"].iter().cloned().collect();
        let slug = unique_slug("how-to-train", |c| Ok(taken.contains(c))).unwrap();
        assert_eq!(slug, "how-to-train-3");
    }

    #[test]
    fn free_base_slug_is_kept_unsuffixed() {
        let slug = unique_slug("fresh-title", |_| Ok(false)).unwrap();
        assert_eq!(slug, "fresh-title");
    }

    #[test]
    fn article_view_wire_shape() {
        let article = Article {
            id: 7,
            author_id: 1,
            slug: "how-to-train".into(),
            title: "How to Train".into(),
            description: "dragons".into(),
            body: "step one".into(),
            tag_list: vec!["dragons".into()],
            created_at: chrono::NaiveDate::from_ymd(2018, 4, 1).and_hms(12, 0, 0),
            updated_at: None,
        };
        let author = Profile {
            username: Cow::Borrowed("alice"),
            bio: None,
            image: None,
            following: false,
        };
        let json =
            serde_json::to_value(&ArticleView::compose(article, author, 1, true)).unwrap();

        assert_eq!(json["slug"], "how-to-train");
        assert_eq!(json["favoritesCount"], 1);
        assert_eq!(json["favorited"], true);
        assert_eq!(json["tagList"], json!(["dragons"]));
        assert_eq!(json["author"]["username"], "alice");
        assert_eq!(json["createdAt"], "2018-04-01T12:00:00.000Z");
        // never-edited articles fall back to the creation time
        assert_eq!(json["updatedAt"], json["createdAt"]);
    }
}
