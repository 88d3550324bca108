use serde::{Deserialize, Serialize};

use crate::model::{ExamSchedule, IvRecord, MealRequest, Vital};

/// One push-channel message per domain event. The wire shape is
/// `{"type": "...", "data": {...}}`, mirrored by the tagged enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushEvent {
    NewVital(VitalEvent),
    NewIv(IvEvent),
    NewMealRequest(MealEvent),
    NewDocRequest(DocumentEvent),
    NewExamSchedule(ExamEvent),
    DeleteExamSchedule(ExamDeleted),
    IvPhotoUploaded(IvPhotoUploaded),
    AdmissionTransferred(AdmissionTransferred),
    AdmissionDischarged(AdmissionDischarged),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalEvent {
    #[serde(flatten)]
    pub vital: Vital,
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvEvent {
    #[serde(flatten)]
    pub record: IvRecord,
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealEvent {
    #[serde(flatten)]
    pub request: MealRequest,
    #[serde(default)]
    pub room: Option<String>,
}

/// Document-request broadcasts carry no row id; the admission view
/// re-derives its list from a fresh snapshot instead of merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEvent {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub request_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamEvent {
    #[serde(flatten)]
    pub schedule: ExamSchedule,
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamDeleted {
    pub id: i64,
    pub admission_id: String,
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvPhotoUploaded {
    pub admission_id: String,
    #[serde(default)]
    pub room_number: Option<String>,
    pub photo_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionTransferred {
    pub admission_id: String,
    #[serde(default)]
    pub old_room: Option<String>,
    #[serde(default)]
    pub new_room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionDischarged {
    pub admission_id: String,
    #[serde(default)]
    pub room: Option<String>,
}

impl PushEvent {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
