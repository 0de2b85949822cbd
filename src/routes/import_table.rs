//! The import form: GET renders it, POST starts an import.

use rocket::State;
use rocket::form::Form;
use rocket::http::{CookieJar, Status};
use rocket::response::Redirect;
use rocket::response::content::RawHtml;

use crate::auth::csrf::{issue_csrf_token, verify_csrf_token};
use crate::auth::{AuthState, RequireImportTable};
use crate::db::DatabaseRegistry;
use crate::importer::Importer;
use crate::jobs::JobQueue;

#[derive(Debug, Default, FromForm)]
pub struct ImportTableForm {
    pub url: Option<String>,
    pub database: Option<String>,
    pub csrftoken: Option<String>,
}

/// Form re-rendered with an inline error.
pub type FormError = (Status, RawHtml<String>);

#[get("/-/import-table")]
pub fn import_table_form(
    _actor: RequireImportTable,
    cookies: &CookieJar<'_>,
    auth: &State<AuthState>,
    registry: &State<DatabaseRegistry>,
) -> RawHtml<String> {
    let csrftoken = issue_csrf_token(cookies, &auth.config);
    RawHtml(render_form(registry, &csrftoken, &ImportTableForm::default(), None))
}

#[post("/-/import-table", data = "<form>")]
pub async fn start_import(
    actor: RequireImportTable,
    form: Form<ImportTableForm>,
    cookies: &CookieJar<'_>,
    auth: &State<AuthState>,
    registry: &State<DatabaseRegistry>,
    importer: &State<Importer>,
    queue: &State<JobQueue>,
) -> Result<Redirect, FormError> {
    let form = form.into_inner();
    let rerender = |status: Status, message: String| -> FormError {
        let csrftoken = issue_csrf_token(cookies, &auth.config);
        (
            status,
            RawHtml(render_form(registry, &csrftoken, &form, Some(&message))),
        )
    };

    if let Err(err) = verify_csrf_token(cookies, &auth.config, form.csrftoken.as_deref()) {
        log::warn!("rejecting import form from '{}': {}", actor.0.id, err);
        return Err(rerender(err.status(), err.to_string()));
    }

    let source_url = form.url.as_deref().unwrap_or_default();
    let destination = registry
        .resolve(form.database.as_deref())
        .map_err(|err| rerender(err.status(), err.to_string()))?;

    let state = match importer.start_import(&actor.0, source_url, destination).await {
        Ok(state) => state,
        Err(err) => {
            log::warn!("import of '{}' failed: {}", source_url, err);
            return Err(rerender(err.status(), err.to_string()));
        }
    };

    if !state.is_complete() {
        match queue.enqueue(source_url.trim(), &state).await {
            Ok(job_id) => log::info!(
                "queued job {} to continue {}/{}",
                job_id,
                state.database,
                state.table_name
            ),
            Err(err) => {
                log::error!("failed to queue remaining pages: {}", err);
                return Err(rerender(
                    Status::InternalServerError,
                    format!("the first page was imported but the rest could not be queued: {err}"),
                ));
            }
        }
    }

    Ok(Redirect::found(state.redirect_path()))
}

fn render_form(
    registry: &DatabaseRegistry,
    csrftoken: &str,
    form: &ImportTableForm,
    error: Option<&str>,
) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Import table</title></head>\n<body>\n<h1>Import table</h1>\n",
    );

    if let Some(message) = error {
        html.push_str(&format!(
            "<p class=\"message-error\">{}</p>\n",
            escape_html(message)
        ));
    }

    html.push_str("<form action=\"/-/import-table\" method=\"post\">\n");
    html.push_str(&format!(
        "<p><label>Table URL <input type=\"text\" name=\"url\" size=\"60\" value=\"{}\"></label></p>\n",
        escape_html(form.url.as_deref().unwrap_or_default())
    ));

    if registry.len() > 1 {
        let selected = form.database.as_deref().unwrap_or_default();
        html.push_str("<p><label>Database <select name=\"database\">\n");
        for name in registry.names() {
            html.push_str(&format!(
                "<option{}>{}</option>\n",
                if name == selected { " selected" } else { "" },
                escape_html(name)
            ));
        }
        html.push_str("</select></label></p>\n");
    }

    html.push_str(&format!(
        "<input type=\"hidden\" name=\"csrftoken\" value=\"{}\">\n",
        escape_html(csrftoken)
    ));
    html.push_str("<p><input type=\"submit\" value=\"Import\"></p>\n</form>\n</body>\n</html>\n");

    html
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use crate::importer::Destination;

    async fn registry(names: &[&str]) -> DatabaseRegistry {
        let mut destinations = Vec::new();
        for name in names {
            destinations.push(Destination::new(*name, open_memory_pool().await.unwrap()));
        }
        DatabaseRegistry::from_destinations(destinations)
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
        );
    }

    #[tokio::test]
    async fn database_select_only_with_several_databases() {
        let single = render_form(&registry(&["data"]).await, "tok", &ImportTableForm::default(), None);
        assert!(!single.contains("<select"));
        assert!(single.contains(r#"name="csrftoken" value="tok""#));

        let form = ImportTableForm {
            database: Some("b".into()),
            ..Default::default()
        };
        let several = render_form(&registry(&["a", "b"]).await, "tok", &form, None);
        assert!(several.contains("<select name=\"database\">"));
        assert!(several.contains("<option selected>b</option>"));
        assert!(several.contains("<option>a</option>"));
    }

    #[tokio::test]
    async fn errors_are_rendered_inline() {
        let form = ImportTableForm {
            url: Some("http://x/<t>".into()),
            ..Default::default()
        };
        let html = render_form(&registry(&["data"]).await, "tok", &form, Some("bad <url>"));
        assert!(html.contains("<p class=\"message-error\">bad &lt;url&gt;</p>"));
        assert!(html.contains("value=\"http://x/&lt;t&gt;\""));
    }
}
