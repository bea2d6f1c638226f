use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgConnection, Postgres, QueryBuilder, Transaction, types::Json};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::application::repos::{
    CreatePageParams, ElementParams, PageFieldsPatch, PagesRepo, PagesTx, RepoError,
};
use crate::domain::entities::{ElementRecord, PageRecord};
use crate::domain::types::{ElementSize, UserId};
use crate::domain::views::ViewCounts;

use super::{PostgresRepositories, map_sqlx_error};

const PAGE_COLUMNS: &str = "SELECT id, page_uuid, page_name, is_root, parent_page_uuid, \
     element_positions, public_page, is_favourite, etc, view_count, date_view_count, \
     user_id, created_at, updated_at, last_updated_at FROM pages";

const ELEMENT_COLUMNS: &str = "SELECT id, element_uuid, page_id, user_id, element_type, \
     content, etc, size, created_at, updated_at FROM elements";

const PAGE_RETURNING: &str = " RETURNING id, page_uuid, page_name, is_root, parent_page_uuid, \
     element_positions, public_page, is_favourite, etc, view_count, date_view_count, \
     user_id, created_at, updated_at, last_updated_at";

const ELEMENT_RETURNING: &str = " RETURNING id, element_uuid, page_id, user_id, element_type, \
     content, etc, size, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PageRow {
    id: i64,
    page_uuid: String,
    page_name: String,
    is_root: bool,
    parent_page_uuid: Option<String>,
    element_positions: Option<Json<Vec<String>>>,
    public_page: bool,
    is_favourite: bool,
    etc: Option<Value>,
    view_count: i64,
    date_view_count: Json<BTreeMap<String, u64>>,
    user_id: Uuid,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    last_updated_at: OffsetDateTime,
}

impl TryFrom<PageRow> for PageRecord {
    type Error = RepoError;

    fn try_from(row: PageRow) -> Result<Self, Self::Error> {
        Ok(PageRecord {
            id: row.id,
            page_uuid: row.page_uuid,
            page_name: row.page_name,
            is_root: row.is_root,
            parent_page_uuid: row.parent_page_uuid,
            element_positions: row
                .element_positions
                .map(|Json(positions)| positions)
                .unwrap_or_default(),
            public_page: row.public_page,
            is_favourite: row.is_favourite,
            etc: row.etc,
            views: ViewCounts::new(
                PostgresRepositories::convert_count(row.view_count)?,
                row.date_view_count.0,
            ),
            user_id: UserId::new(row.user_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_updated_at: row.last_updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ElementRow {
    id: i64,
    element_uuid: String,
    page_id: i64,
    user_id: Uuid,
    element_type: String,
    content: Value,
    etc: Option<Value>,
    size: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ElementRow> for ElementRecord {
    type Error = RepoError;

    fn try_from(row: ElementRow) -> Result<Self, Self::Error> {
        let size = row
            .size
            .as_deref()
            .map(str::parse::<ElementSize>)
            .transpose()
            .map_err(|err| RepoError::Integrity {
                message: err.to_string(),
            })?;

        Ok(ElementRecord {
            id: row.id,
            element_uuid: row.element_uuid,
            page_id: row.page_id,
            user_id: UserId::new(row.user_id),
            element_type: row.element_type,
            content: row.content,
            etc: row.etc,
            size,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn stored_positions(positions: &[String]) -> Option<Json<&[String]>> {
    (!positions.is_empty()).then_some(Json(positions))
}

fn stored_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

async fn fetch_page(
    conn: &mut PgConnection,
    page_uuid: &str,
) -> Result<Option<PageRecord>, RepoError> {
    let mut qb = QueryBuilder::<Postgres>::new(PAGE_COLUMNS);
    qb.push(" WHERE page_uuid = ");
    qb.push_bind(page_uuid);

    qb.build_query_as::<PageRow>()
        .fetch_optional(conn)
        .await
        .map_err(map_sqlx_error)?
        .map(PageRecord::try_from)
        .transpose()
}

async fn fetch_pages(
    conn: &mut PgConnection,
    mut qb: QueryBuilder<'_, Postgres>,
) -> Result<Vec<PageRecord>, RepoError> {
    qb.build_query_as::<PageRow>()
        .fetch_all(conn)
        .await
        .map_err(map_sqlx_error)?
        .into_iter()
        .map(PageRecord::try_from)
        .collect()
}

#[async_trait]
impl PagesRepo for PostgresRepositories {
    async fn find_page(&self, page_uuid: &str) -> Result<Option<PageRecord>, RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        fetch_page(&mut conn, page_uuid).await
    }

    async fn list_pages_for_owner(&self, owner: UserId) -> Result<Vec<PageRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(PAGE_COLUMNS);
        qb.push(" WHERE user_id = ");
        qb.push_bind(owner.as_uuid());
        qb.push(" ORDER BY is_favourite DESC, last_updated_at DESC, id DESC");

        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        fetch_pages(&mut conn, qb).await
    }

    async fn list_sub_pages(&self, parent_uuid: &str) -> Result<Vec<PageRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(PAGE_COLUMNS);
        qb.push(" WHERE parent_page_uuid = ");
        qb.push_bind(parent_uuid);
        qb.push(" ORDER BY id");

        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        fetch_pages(&mut conn, qb).await
    }

    async fn list_elements(&self, page_id: i64) -> Result<Vec<ElementRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(ELEMENT_COLUMNS);
        qb.push(" WHERE page_id = ");
        qb.push_bind(page_id);
        qb.push(" ORDER BY id");

        qb.build_query_as::<ElementRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(ElementRecord::try_from)
            .collect()
    }

    async fn touch_last_updated(
        &self,
        page_id: i64,
        at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE pages SET last_updated_at = $2 WHERE id = $1")
            .bind(page_id)
            .bind(at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn record_view(&self, page_id: i64, today: Date) -> Result<ViewCounts, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let (total, by_date): (i64, Json<BTreeMap<String, u64>>) = sqlx::query_as(
            "SELECT view_count, date_view_count FROM pages WHERE id = $1 FOR UPDATE",
        )
        .bind(page_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let counts = ViewCounts::new(Self::convert_count(total)?, by_date.0).bump(today);

        sqlx::query("UPDATE pages SET view_count = $2, date_view_count = $3 WHERE id = $1")
            .bind(page_id)
            .bind(stored_count(counts.total))
            .bind(Json(&counts.by_date))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(counts)
    }

    async fn begin(&self) -> Result<Box<dyn PagesTx>, RepoError> {
        let tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgPagesTx { tx }))
    }
}

pub struct PgPagesTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PagesTx for PgPagesTx {
    async fn find_page(&mut self, page_uuid: &str) -> Result<Option<PageRecord>, RepoError> {
        fetch_page(&mut *self.tx, page_uuid).await
    }

    async fn create_page(&mut self, params: CreatePageParams) -> Result<PageRecord, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO pages (page_uuid, page_name, is_root, parent_page_uuid, \
             element_positions, public_page, is_favourite, etc, view_count, date_view_count, \
             user_id, created_at, updated_at, last_updated_at) ",
        );
        qb.push_values(std::iter::once(&params), |mut row, params| {
            row.push_bind(&params.page_uuid)
                .push_bind(&params.page_name)
                .push_bind(params.is_root)
                .push_bind(params.parent_page_uuid.as_deref())
                .push_bind(stored_positions(&params.element_positions))
                .push_bind(params.public_page)
                .push_bind(params.is_favourite)
                .push_bind(params.etc.as_ref())
                .push_bind(0_i64)
                .push_bind(Json(BTreeMap::<String, u64>::new()))
                .push_bind(params.user_id.as_uuid())
                .push_bind(params.created_at)
                .push_bind(params.created_at)
                .push_bind(params.created_at);
        });
        qb.push(PAGE_RETURNING);

        let row = qb
            .build_query_as::<PageRow>()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        PageRecord::try_from(row)
    }

    async fn update_page_fields(
        &mut self,
        page_id: i64,
        patch: &PageFieldsPatch,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE pages SET \
                page_name = COALESCE($2::text, page_name), \
                is_root = COALESCE($3::boolean, is_root), \
                public_page = COALESCE($4::boolean, public_page), \
                is_favourite = COALESCE($5::boolean, is_favourite), \
                view_count = CASE WHEN $6::boolean THEN 0 ELSE view_count END, \
                date_view_count = CASE WHEN $6::boolean THEN '{}'::jsonb ELSE date_view_count END, \
                updated_at = now() \
             WHERE id = $1",
        )
        .bind(page_id)
        .bind(patch.page_name.as_deref())
        .bind(patch.is_root)
        .bind(patch.public_page)
        .bind(patch.is_favourite)
        .bind(patch.reset_views)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn set_element_positions(
        &mut self,
        page_id: i64,
        positions: &[String],
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE pages SET element_positions = $2, updated_at = now() WHERE id = $1")
            .bind(page_id)
            .bind(stored_positions(positions))
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_element(
        &mut self,
        element_uuid: &str,
    ) -> Result<Option<ElementRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(ELEMENT_COLUMNS);
        qb.push(" WHERE element_uuid = ");
        qb.push_bind(element_uuid);

        qb.build_query_as::<ElementRow>()
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?
            .map(ElementRecord::try_from)
            .transpose()
    }

    async fn create_element(
        &mut self,
        page_id: i64,
        owner: UserId,
        params: &ElementParams,
    ) -> Result<ElementRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO elements (element_uuid, page_id, user_id, element_type, content, etc, \
             size, created_at, updated_at) ",
        );
        qb.push_values(std::iter::once(params), |mut row, params| {
            row.push_bind(&params.element_uuid)
                .push_bind(page_id)
                .push_bind(owner.as_uuid())
                .push_bind(&params.element_type)
                .push_bind(&params.content)
                .push_bind(params.etc.as_ref())
                .push_bind(params.size.map(|size| size.as_str()))
                .push_bind(now)
                .push_bind(now);
        });
        qb.push(ELEMENT_RETURNING);

        let row = qb
            .build_query_as::<ElementRow>()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        ElementRecord::try_from(row)
    }

    async fn update_element(
        &mut self,
        element_id: i64,
        params: &ElementParams,
    ) -> Result<ElementRecord, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE elements SET element_type = ");
        qb.push_bind(&params.element_type);
        qb.push(", content = ");
        qb.push_bind(&params.content);
        qb.push(", etc = ");
        qb.push_bind(params.etc.as_ref());
        qb.push(", size = ");
        qb.push_bind(params.size.map(|size| size.as_str()));
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(element_id);
        qb.push(ELEMENT_RETURNING);

        let row = qb
            .build_query_as::<ElementRow>()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        ElementRecord::try_from(row)
    }

    async fn delete_element(&mut self, element_id: i64) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM elements WHERE id = $1")
            .bind(element_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_owned_children(
        &mut self,
        parent_uuid: &str,
        owner: UserId,
    ) -> Result<Vec<PageRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(PAGE_COLUMNS);
        qb.push(" WHERE parent_page_uuid = ");
        qb.push_bind(parent_uuid);
        qb.push(" AND user_id = ");
        qb.push_bind(owner.as_uuid());
        qb.push(" ORDER BY id");

        fetch_pages(&mut *self.tx, qb).await
    }

    async fn purge_elements(&mut self, page_id: i64) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM elements WHERE page_id = $1")
            .bind(page_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn purge_page(&mut self, page_id: i64) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM pages WHERE id = $1")
            .bind(page_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}
