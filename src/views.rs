//! HTML pages.
//!
//! Inline templates without a template engine. Anything user-supplied goes
//! through [`html_escape`] before it lands in markup.

const STYLES: &str = r#"
    body {
        font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Arial, sans-serif;
        max-width: 720px;
        margin: 40px auto;
        padding: 0 20px;
        background: #f5f5f5;
        color: #333;
    }
    .container {
        background: white;
        padding: 30px;
        border-radius: 8px;
        box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        text-align: center;
    }
    h1 { margin-top: 0; }
    form { margin: 20px 0; text-align: left; }
    .form-group { margin: 15px 0; }
    label { display: block; font-weight: bold; margin-bottom: 5px; }
    input[type="email"], input[type="password"], input[type="text"] {
        width: 100%;
        padding: 10px;
        border: 1px solid #ddd;
        border-radius: 4px;
        box-sizing: border-box;
    }
    .btn {
        display: inline-block;
        background: #333;
        color: white;
        padding: 10px 20px;
        border: none;
        border-radius: 4px;
        cursor: pointer;
        text-decoration: none;
        margin: 4px;
    }
    .btn-light { background: #eee; color: #333; }
    .btn-google { background: #db4437; }
    .secret { font-size: 1.2em; margin: 12px 0; }
    .error {
        color: #a94442;
        background: #f2dede;
        padding: 10px;
        border-radius: 4px;
        margin: 10px 0;
    }
"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Secrets - {title}</title>
    <style>{STYLES}</style>
</head>
<body>
    <div class="container">
{body}
    </div>
</body>
</html>"#
    )
}

fn error_block(error: Option<&str>) -> String {
    error.map_or(String::new(), |e| {
        format!(r#"<div class="error">{}</div>"#, html_escape(e))
    })
}

fn google_button(enabled: bool) -> &'static str {
    if enabled {
        r#"<p><a class="btn btn-google" href="/auth/google" role="button">Sign in with Google</a></p>"#
    } else {
        ""
    }
}

pub fn home_page() -> String {
    layout(
        "Home",
        r#"        <h1>Secrets</h1>
        <p>Don't keep your secrets, share them anonymously!</p>
        <a class="btn btn-light" href="/register" role="button">Register</a>
        <a class="btn" href="/login" role="button">Login</a>"#,
    )
}

fn credentials_form(action: &str, submit: &str) -> String {
    format!(
        r#"<form method="POST" action="{action}">
            <div class="form-group">
                <label for="username">Email</label>
                <input type="email" id="username" name="username" required autofocus>
            </div>
            <div class="form-group">
                <label for="password">Password</label>
                <input type="password" id="password" name="password" required>
            </div>
            <button type="submit" class="btn">{submit}</button>
        </form>"#
    )
}

pub fn register_page(error: Option<&str>, google_enabled: bool) -> String {
    let body = format!(
        r#"        <h1>Register</h1>
        {}
        {}
        {}
        <p>Already have an account? <a href="/login">Login here</a></p>"#,
        error_block(error),
        credentials_form("/register", "Register"),
        google_button(google_enabled),
    );
    layout("Register", &body)
}

pub fn login_page(error: Option<&str>, google_enabled: bool) -> String {
    let body = format!(
        r#"        <h1>Login</h1>
        {}
        {}
        {}
        <p>No account yet? <a href="/register">Register here</a></p>"#,
        error_block(error),
        credentials_form("/login", "Login"),
        google_button(google_enabled),
    );
    layout("Login", &body)
}

/// Confirmation shown by the session-less variant after register or login.
pub fn unlocked_page() -> String {
    layout(
        "Secrets",
        r#"        <h1>You've Discovered My Secret!</h1>
        <p class="secret">Jack Bauer is my hero.</p>
        <a class="btn btn-light" href="/" role="button">Log Out</a>"#,
    )
}

pub fn secrets_page(secrets: &[String]) -> String {
    let list = if secrets.is_empty() {
        r#"<p><em>No secrets have been shared yet.</em></p>"#.to_string()
    } else {
        secrets
            .iter()
            .map(|s| format!(r#"<p class="secret">{}</p>"#, html_escape(s)))
            .collect::<Vec<_>>()
            .join("\n        ")
    };

    let body = format!(
        r#"        <h1>You've Discovered My Secret!</h1>
        {list}
        <hr>
        <a class="btn btn-light" href="/logout" role="button">Log Out</a>
        <a class="btn" href="/submit" role="button">Submit a Secret</a>"#
    );
    layout("Secrets", &body)
}

pub fn submit_page() -> String {
    layout(
        "Submit",
        r#"        <h1>Secrets</h1>
        <p>Don't keep your secrets, share them anonymously!</p>
        <form method="POST" action="/submit">
            <div class="form-group">
                <input type="text" name="secret" placeholder="What's your secret?" required>
            </div>
            <button type="submit" class="btn">Submit</button>
        </form>"#,
    )
}

pub fn error_page() -> String {
    layout(
        "Error",
        r#"        <h1>Something went wrong</h1>
        <p>Please try again later.</p>
        <a class="btn btn-light" href="/" role="button">Home</a>"#,
    )
}

pub fn not_found_page() -> String {
    layout(
        "Not Found",
        r#"        <h1>Page not found</h1>
        <a class="btn btn-light" href="/" role="button">Home</a>"#,
    )
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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
