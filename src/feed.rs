use diesel::prelude::*;
use rocket_contrib::json::Json;
use std::collections::{HashMap, HashSet};

use crate::article::{Article, ArticleView};
use crate::db::schema::{articles, favorites, users};
use crate::db::DbConnection;
use crate::friends;
use crate::types::{ApiError, ApiResult};
use crate::users::models::User;
use crate::users::CurrentUser;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// Listing window. The default is bounded so an unfiltered listing never
/// turns into a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn clamp(limit: Option<i64>, offset: Option<i64>) -> Page {
        Page {
            limit: limit.unwrap_or(DEFAULT_LIMIT).max(1).min(MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArticlesResponse<'a> {
    articles: Vec<ArticleView<'a>>,
    // the count of the returned page, not of all matches
    #[serde(rename = "articlesCount")]
    articles_count: usize,
}

impl<'a> ArticlesResponse<'a> {
    fn from_views(articles: Vec<ArticleView<'a>>) -> ArticlesResponse<'a> {
        let articles_count = articles.len();
        ArticlesResponse {
            articles,
            articles_count,
        }
    }
}

/// Annotates a page of (article, author) rows with derived favorite counts,
/// the viewer's favorite edges, and the viewer's following set, using batch
/// probes rather than one query per row.
fn annotate(
    data: Vec<(Article, User)>,
    viewer: Option<&User>,
    connection: &PgConnection,
) -> Result<Vec<ArticleView<'static>>, ApiError> {
    let ids = data.iter().map(|(article, _)| article.id).collect::<Vec<i32>>();

    let mut counts: HashMap<i32, i64> = HashMap::new();
    let edges = favorites::table
        .filter(favorites::article_id.eq_any(&ids))
        .select((favorites::article_id, favorites::user_id))
        .load::<(i32, i32)>(connection)?;
    for (article_id, _) in &edges {
        *counts.entry(*article_id).or_insert(0) += 1;
    }

    let (mine, following): (HashSet<i32>, HashSet<i32>) = match viewer {
        Some(viewer) => {
            let mine = edges
                .iter()
                .filter(|(_, user_id)| *user_id == viewer.id)
                .map(|(article_id, _)| *article_id)
                .collect();
            let following = friends::following_ids(viewer.id, connection)?
                .into_iter()
                .collect();
            (mine, following)
        }
        None => (HashSet::new(), HashSet::new()),
    };

    Ok(data
        .into_iter()
        .map(|(article, author)| {
            let favorited = mine.contains(&article.id);
            let count = counts.get(&article.id).cloned().unwrap_or(0);
            let follows = following.contains(&author.id);
            ArticleView::compose(article, author.into_profile(follows), count, favorited)
        })
        .collect())
}

#[get(
    "/?<author>&<favorited>&<tag>&<limit>&<offset>",
    format = "application/json"
)]
pub fn find_all(
    connection: DbConnection,
    current_user: Option<User>,
    author: Option<String>,
    favorited: Option<String>,
    tag: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> ApiResult<ArticlesResponse<'static>> {
    let page = Page::clamp(limit, offset);

    let mut query = articles::table
        .inner_join(users::table)
        .into_boxed();

    if let Some(author) = author {
        query = query.filter(users::username.eq(author));
    }

    if let Some(tag) = tag {
        query = query.filter(articles::tag_list.contains(vec![tag]));
    }

    if let Some(favorited) = favorited {
        let favoriting_user = users::table
            .filter(users::username.eq(favorited))
            .get_result::<User>(&*connection)
            .optional()?;
        match favoriting_user {
            Some(user) => {
                let favorite_ids = favorites::table
                    .filter(favorites::user_id.eq(user.id))
                    .select(favorites::article_id);
                query = query.filter(articles::id.eq_any(favorite_ids));
            }
            // filtering on an unknown user matches nothing
            None => return Ok(Json(ArticlesResponse::from_views(Vec::new()))),
        }
    }

    let data = query
        .order((articles::created_at.desc(), articles::slug.asc()))
        .limit(page.limit)
        .offset(page.offset)
        .load::<(Article, User)>(&*connection)?;

    let views = annotate(data, current_user.as_ref(), &connection)?;
    Ok(Json(ArticlesResponse::from_views(views)))
}

#[get("/feed?<limit>&<offset>", format = "application/json")]
pub fn find_feed(
    connection: DbConnection,
    current_user: CurrentUser,
    limit: Option<i64>,
    offset: Option<i64>,
) -> ApiResult<ArticlesResponse<'static>> {
    let current = current_user?;
    let page = Page::clamp(limit, offset);

    let followed = friends::following_ids(current.id, &connection)?;
    if followed.is_empty() {
        // nobody followed is an empty page, not an error
        return Ok(Json(ArticlesResponse::from_views(Vec::new())));
    }

    let data = articles::table
        .inner_join(users::table)
        .filter(articles::author_id.eq_any(followed))
        .order((articles::created_at.desc(), articles::slug.asc()))
        .limit(page.limit)
        .offset(page.offset)
        .load::<(Article, User)>(&*connection)?;

    let views = annotate(data, Some(&current), &connection)?;
    Ok(Json(ArticlesResponse::from_views(views)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_are_bounded() {
        assert_eq!(Page::clamp(None, None), Page { limit: 20, offset: 0 });
    }

    #[test]
    fn limit_is_clamped_both_ways() {
        assert_eq!(Page::clamp(Some(1000), None).limit, 100);
        assert_eq!(Page::clamp(Some(0), None).limit, 1);
        assert_eq!(Page::clamp(Some(-5), None).limit, 1);
        assert_eq!(Page::clamp(Some(50), None).limit, 50);
    }

    #[test]
    fn negative_offset_is_floored() {
        assert_eq!(Page::clamp(None, Some(-10)).offset, 0);
        assert_eq!(Page::clamp(None, Some(40)).offset, 40);
    }

    #[test]
    fn page_count_is_page_length() {
        let response = ArticlesResponse::from_views(Vec::new());
        assert_eq!(response.articles_count, 0);
    }
}
