use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Deserialize, JsonSchema)]
pub struct ExpandParams {
    /// Question to expand into retrieval queries
    pub question: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct DecomposeParams {
    /// Question to decompose into one query per aspect
    pub question: String,
}
