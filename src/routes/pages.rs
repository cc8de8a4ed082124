//! Server-rendered pages.
//!
//! The dashboard renders the list once on the server so it is usable before
//! the live socket connects; after that the inline script replaces the list
//! with each `bookmark:snapshot` the socket pushes.

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::warn;

use super::gate::Authenticated;
use crate::bookmark::Bookmark;
use crate::state::AppState;
use crate::supabase::Identity;

const AUTH_FAILED_MESSAGE: &str = "Sign-in failed. Please try again.";

/// `GET /`: everything lives on the dashboard.
pub async fn root() -> Redirect {
    Redirect::temporary("/dashboard")
}

#[derive(Deserialize)]
pub struct LoginQuery {
    error: Option<String>,
}

/// `GET /login`: sign-in page; signed-in visitors go straight to the dashboard.
pub async fn login(auth: Option<Authenticated>, Query(params): Query<LoginQuery>) -> Response {
    if auth.is_some() {
        return Redirect::temporary("/dashboard").into_response();
    }
    let banner = match params.error.as_deref() {
        Some("auth_failed") => Some(AUTH_FAILED_MESSAGE),
        _ => None,
    };
    Html(render_login(banner)).into_response()
}

/// `GET /dashboard`: the signed-in user's bookmarks.
pub async fn dashboard(State(state): State<AppState>, auth: Authenticated) -> Html<String> {
    let store = state.data.store(&auth.access_token);
    let (bookmarks, error) = match store.list_by_owner(&auth.identity.id).await {
        Ok(rows) => (rows, None),
        Err(e) => {
            warn!(user_id = %auth.identity.id, error = %e, "dashboard: bookmark load failed");
            (Vec::new(), Some("Could not load bookmarks."))
        }
    };
    Html(render_dashboard(&auth.identity, &bookmarks, error))
}

// =============================================================================
// RENDERING
// =============================================================================

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

pub(crate) fn render_login(banner: Option<&str>) -> String {
    let banner = banner.map_or(String::new(), |msg| format!("<p class=\"error\">{}</p>", escape_html(msg)));
    layout(
        "Smart Bookmarks",
        &format!(
            "<main class=\"card center\">\n<h1>Smart Bookmarks</h1>\n\
             <p class=\"muted\">Save links. Stay organized. Real-time sync.</p>\n{banner}\n\
             <a class=\"button\" href=\"/auth/login\">Sign in with Google</a>\n</main>"
        ),
    )
}

fn render_item(bookmark: &Bookmark) -> String {
    let id = escape_html(&bookmark.id);
    let url = escape_html(&bookmark.url);
    let href = if bookmark.has_web_url() { format!(" href=\"{url}\"") } else { String::new() };
    format!(
        "<li data-id=\"{id}\"><a{href} target=\"_blank\" rel=\"noopener noreferrer\">{title}</a>\
         <span class=\"muted\">{url}</span>\
         <button class=\"delete\" data-id=\"{id}\" type=\"button\">Delete</button></li>",
        title = escape_html(&bookmark.title),
    )
}

pub(crate) fn render_dashboard(identity: &Identity, bookmarks: &[Bookmark], error: Option<&str>) -> String {
    let who = escape_html(identity.email.as_deref().unwrap_or(&identity.id));
    let items: String = bookmarks.iter().map(render_item).collect();
    let empty_hidden = if bookmarks.is_empty() { "" } else { " hidden" };
    let load_error = error.map_or(String::new(), escape_html);
    layout(
        "Your bookmarks",
        &format!(
            "<header><h1>Smart Bookmarks</h1><span class=\"muted\">{who}</span>\
             <form method=\"post\" action=\"/auth/logout\"><button type=\"submit\">Sign out</button></form></header>\n\
             <main class=\"card\">\n\
             <form id=\"add\"><input name=\"title\" placeholder=\"Bookmark title\">\
             <input name=\"url\" placeholder=\"https://example.com\"><button type=\"submit\">Add</button></form>\n\
             <p id=\"form-error\" class=\"error\"></p>\n\
             <p id=\"load-error\" class=\"error\">{load_error}</p>\n\
             <p id=\"empty\" class=\"muted\"{empty_hidden}>No bookmarks yet.</p>\n\
             <ul id=\"bookmarks\">{items}</ul>\n</main>\n<script>{LIVE_SCRIPT}</script>"
        ),
    )
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;background:#111827;color:#f3f4f6;margin:0;padding:2rem}\
.card{max-width:40rem;margin:0 auto;padding:1.5rem;border:1px solid #1f2937;border-radius:1rem;background:#0b1220}\
.center{text-align:center;max-width:24rem}.muted{color:#9ca3af;font-size:.875rem}.error{color:#f87171;font-size:.875rem}\
header{display:flex;gap:1rem;align-items:center;justify-content:space-between;max-width:40rem;margin:0 auto 1rem}\
input{padding:.5rem;margin-right:.5rem;border-radius:.5rem;border:1px solid #374151;background:#1f2937;color:inherit}\
button,.button{padding:.5rem 1rem;border-radius:.5rem;border:0;background:#2563eb;color:#fff;cursor:pointer;text-decoration:none}\
ul{list-style:none;padding:0}li{display:flex;gap:.75rem;align-items:center;padding:.5rem 0;border-bottom:1px solid #1f2937}\
li a{color:#93c5fd;flex:0 0 auto}li .muted{flex:1;overflow:hidden;text-overflow:ellipsis;white-space:nowrap}\
button.delete{background:#7f1d1d}";

/// Live client: one socket, frames in the `{id, parent_id, ts, syscall,
/// status, data}` envelope; snapshots re-render the list.
const LIVE_SCRIPT: &str = r#"
(() => {
  const list = document.getElementById("bookmarks");
  const empty = document.getElementById("empty");
  const formError = document.getElementById("form-error");
  const loadError = document.getElementById("load-error");
  const form = document.getElementById("add");
  const pending = new Map();
  let socket;

  const request = (syscall, data) => new Promise((resolve, reject) => {
    const frame = { id: crypto.randomUUID(), parent_id: null, ts: Date.now(), syscall, status: "request", data };
    pending.set(frame.id, { resolve, reject });
    socket.send(JSON.stringify(frame));
  });

  const isWebUrl = (url) => {
    try {
      return ["http:", "https:"].includes(new URL(url).protocol);
    } catch {
      return false;
    }
  };

  const render = (bookmarks) => {
    list.replaceChildren(...bookmarks.map((b) => {
      const li = document.createElement("li");
      li.dataset.id = b.id;
      const a = document.createElement("a");
      if (isWebUrl(b.url)) a.href = b.url;
      a.target = "_blank"; a.rel = "noopener noreferrer"; a.textContent = b.title;
      const span = document.createElement("span");
      span.className = "muted"; span.textContent = b.url;
      const del = document.createElement("button");
      del.className = "delete"; del.type = "button"; del.dataset.id = b.id; del.textContent = "Delete";
      li.append(a, span, del);
      return li;
    }));
    empty.hidden = bookmarks.length > 0;
  };

  const connect = () => {
    const scheme = location.protocol === "https:" ? "wss" : "ws";
    socket = new WebSocket(`${scheme}://${location.host}/api/live`);
    socket.onmessage = (event) => {
      const frame = JSON.parse(event.data);
      if (frame.syscall === "bookmark:snapshot" && frame.status === "request") {
        render(frame.data.bookmarks || []);
        loadError.textContent = frame.data.error || "";
        return;
      }
      const waiter = frame.parent_id && pending.get(frame.parent_id);
      if (!waiter) return;
      pending.delete(frame.parent_id);
      if (frame.status === "done") waiter.resolve(frame.data);
      else waiter.reject(frame.data || {});
    };
    socket.onclose = (event) => {
      for (const waiter of pending.values()) waiter.reject({ message: "Connection lost." });
      pending.clear();
      if (event.code === 4401) {
        location.reload();
        return;
      }
      setTimeout(connect, 2000);
    };
  };

  form.addEventListener("submit", async (event) => {
    event.preventDefault();
    formError.textContent = "";
    const button = form.querySelector("button");
    button.disabled = true; button.textContent = "Adding…";
    try {
      await request("bookmark:create", { title: form.title.value, url: form.url.value });
      form.reset();
    } catch (err) {
      const validation = typeof err.code === "string" && !err.code.startsWith("E_STORE");
      formError.textContent = validation ? err.message : `Failed: ${err.message || "unknown error"}`;
    } finally {
      button.disabled = false; button.textContent = "Add";
    }
  });

  list.addEventListener("click", async (event) => {
    const id = event.target.dataset && event.target.dataset.id;
    if (!id || !event.target.classList.contains("delete")) return;
    try {
      await request("bookmark:delete", { id });
    } catch (err) {
      loadError.textContent = `Delete failed: ${err.message || "unknown error"}`;
    }
  });

  connect();
})();
"#;

#[cfg(test)]
#[path = "pages_test.rs"]
mod tests;
