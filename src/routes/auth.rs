use askama::Template;
use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use tower_sessions::Session;

use crate::auth::{login_user, logout_user};
use crate::error::{is_unique_violation, AppError};
use crate::models::User;
use crate::password::{self, MIN_PASSWORD_LEN};
use crate::AppState;

const REQUIRED: &str = "This field is required.";
const EMAIL_TAKEN: &str = "User with that email already exists.";
const BAD_LOGIN: &str = "Email or password doesn't match.";

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    email: String,
    error: Option<String>,
    static_hash: &'static str,
    user: Option<User>,
}

impl LoginTemplate {
    fn new(email: String, error: Option<String>) -> Self {
        Self {
            email,
            error,
            static_hash: crate::STATIC_HASH,
            user: None,
        }
    }
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    form: RegisterForm,
    errors: HashMap<String, String>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    email: String,
    username: String,
    password: String,
    password2: String,
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Field checks that need no database. Email uniqueness is checked by the handler.
fn validate_register_form(form: &RegisterForm) -> HashMap<String, String> {
    let mut errors = HashMap::new();

    let email = form.email.trim();
    if email.is_empty() {
        errors.insert("email".to_string(), REQUIRED.to_string());
    } else if !looks_like_email(email) {
        errors.insert("email".to_string(), "Invalid email address.".to_string());
    }

    if form.username.trim().is_empty() {
        errors.insert("username".to_string(), REQUIRED.to_string());
    }

    if form.password.is_empty() {
        errors.insert("password".to_string(), REQUIRED.to_string());
    } else if form.password.chars().count() < MIN_PASSWORD_LEN {
        errors.insert(
            "password".to_string(),
            format!("Field must be at least {MIN_PASSWORD_LEN} characters long."),
        );
    } else if form.password != form.password2 {
        errors.insert("password".to_string(), "Passwords must match.".to_string());
    }

    if form.password2.is_empty() {
        errors.insert("password2".to_string(), REQUIRED.to_string());
    }

    errors
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page))
        .route("/login", post(login_submit))
        .route("/register", get(register_page))
        .route("/register", post(register_submit))
        .route("/logout", post(logout))
}

fn render_register(form: RegisterForm, errors: HashMap<String, String>) -> Result<Response, AppError> {
    let template = RegisterTemplate {
        form,
        errors,
        static_hash: crate::STATIC_HASH,
        user: None,
    };
    Ok(Html(template.render()?).into_response())
}

async fn login_page() -> Result<impl IntoResponse, AppError> {
    Ok(Html(LoginTemplate::new(String::new(), None).render()?))
}

async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let user = {
        let mut conn = state.db.acquire().await?;
        User::find_by_email(&mut conn, &form.email).await?
    };

    let verified = match &user {
        Some(user) => password::verify_password(form.password, user.password_hash.clone()).await?,
        None => false,
    };

    match user {
        Some(user) if verified => {
            login_user(&session, user).await?;
            Ok(Redirect::to("/").into_response())
        }
        _ => {
            tracing::warn!("failed login attempt");
            let template = LoginTemplate::new(form.email, Some(BAD_LOGIN.to_string()));
            Ok(Html(template.render()?).into_response())
        }
    }
}

async fn register_page() -> Result<Response, AppError> {
    render_register(RegisterForm::default(), HashMap::new())
}

async fn register_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let mut errors = validate_register_form(&form);
    if !errors.contains_key("email") {
        let mut conn = state.db.acquire().await?;
        if User::find_by_email(&mut conn, &form.email).await?.is_some() {
            errors.insert("email".to_string(), EMAIL_TAKEN.to_string());
        }
    }
    if !errors.is_empty() {
        return render_register(form, errors);
    }

    let password_hash = password::hash_password(form.password.clone()).await?;
    let user = User::new(form.username.clone(), &form.email, password_hash);

    let inserted = {
        let mut conn = state.db.acquire().await?;
        user.insert(&mut conn).await
    };
    match inserted {
        Err(e) if is_unique_violation(&e) => {
            let errors = HashMap::from([("email".to_string(), EMAIL_TAKEN.to_string())]);
            return render_register(form, errors);
        }
        result => result?,
    }

    tracing::info!(user_id = %user.id, "user registered");
    login_user(&session, user).await?;
    Ok(Redirect::to("/").into_response())
}

async fn logout(session: Session) -> Result<impl IntoResponse, AppError> {
    logout_user(&session).await?;
    Ok(Redirect::to("/login"))
}
