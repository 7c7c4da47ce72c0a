use serde::Deserialize;

/// Body of `POST /signals/generate`. Fields are optional so that a missing
/// one is answered with 400 by the handler rather than a 422 by the extractor.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSignalRequest {
    pub currency_pair: Option<String>,
    pub expiration_minutes: Option<i32>,
}

/// Body of `PATCH /signals/:id/result`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResultRequest {
    pub result: Option<String>,
    pub win_amount: Option<f32>,
}
