//! GraphQL schema and its HTTP endpoint.

pub mod context;
pub mod guards;
pub mod mutations;
pub mod query;
pub mod types;

use async_graphql::{http::GraphiQLSource, EmptySubscription, Pos, Schema};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    http::HeaderMap,
    response::{Html, IntoResponse},
    routing::get,
    Extension, Router,
};
use tracing::debug;

use crate::auth::extractors::{bearer_token, client_id, request_locale};
use crate::state::AppState;
use context::RequestContext;
use mutations::MutationRoot;
use query::QueryRoot;

pub type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub const MAX_QUERY_DEPTH: usize = 10;
/// Bounds the number of selected fields, which also caps how many aliased
/// mutations a single document can carry.
pub const MAX_QUERY_COMPLEXITY: usize = 200;

pub fn build_schema(state: AppState) -> AppSchema {
    Schema::build(QueryRoot, MutationRoot::default(), EmptySubscription)
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .data(state)
        .finish()
}

pub fn router(schema: AppSchema) -> Router<AppState> {
    Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .layer(Extension(schema))
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

/// Resolves locale, client and caller from the headers before executing.
fn request_context(headers: &HeaderMap, state: &AppState) -> Result<RequestContext, async_graphql::Error> {
    let locale = request_locale(headers);
    let client_id = client_id(headers, state).map_err(|e| e.into_graphql(&locale))?;
    let access_token = bearer_token(headers).map(str::to_string);
    let claims = access_token.as_deref().and_then(|token| match state.keys.verify_access(token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(error = %e, "ignoring invalid access token");
            None
        }
    });
    Ok(RequestContext {
        claims,
        access_token,
        client_id,
        locale,
    })
}

async fn graphql_handler(
    State(state): State<AppState>,
    Extension(schema): Extension<AppSchema>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    match request_context(&headers, &state) {
        Ok(ctx) => schema.execute(req.into_inner().data(ctx)).await.into(),
        Err(e) => async_graphql::Response::from_errors(vec![e.into_server_error(Pos::default())]).into(),
    }
}
