use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SecretForm {
    pub secret: String,
}
