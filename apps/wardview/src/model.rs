use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which logical view a session is bound to. Immutable once a session is
/// opened; switching scope tears the session down and builds a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Nurse-station console: every bed on the ward.
    Station,
    /// One patient's dashboard, addressed by its admission access token.
    Admission { token: String },
}

impl Scope {
    /// Push-channel name: `STATION` for the shared console, the raw token
    /// for a guardian dashboard.
    pub fn channel_name(&self) -> &str {
        match self {
            Scope::Station => "STATION",
            Scope::Admission { token } => token,
        }
    }

    pub fn admission_token(&self) -> Option<&str> {
        match self {
            Scope::Station => None,
            Scope::Admission { token } => Some(token),
        }
    }
}

/// Ward room layout. Beds exist even while unoccupied; a station snapshot
/// fills in whichever rooms currently hold an admission.
pub const ROOM_NUMBERS: &[&str] = &[
    "301", "302", "303", "304", "305", "306", "307", "308", "309", "310-1", "310-2", "311-1",
    "311-2", "311-3", "311-4", "312", "313", "314", "315-1", "315-2", "315-3", "315-4", "401-1",
    "401-2", "401-3", "401-4", "402-1", "402-2", "402-3", "402-4",
];

pub const DEFAULT_TEMPERATURE: f64 = 36.5;
pub const DEFAULT_INFUSION_RATE: i32 = 20;
pub const FEVER_THRESHOLD: f64 = 38.0;

pub fn meal_label(code: &str) -> &str {
    match code {
        "GENERAL" => "general diet",
        "SOFT" => "soft diet",
        "NPO" => "nil by mouth",
        other => other,
    }
}

pub fn document_label(code: &str) -> &str {
    match code {
        "RECEIPT" => "billing receipt",
        "DETAIL" => "itemized bill",
        "CERT" => "admission certificate",
        "DIAGNOSIS" => "diagnosis letter",
        "INITIAL" => "initial assessment record",
        other => other,
    }
}

/// A temperature reading. Optimistic entries carry a client-generated
/// `temp_id` and FIFO `entry_tag` until the authoritative record arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vital {
    #[serde(default)]
    pub id: Option<i64>,
    pub admission_id: String,
    pub temperature: f64,
    #[serde(default)]
    pub has_medication: bool,
    #[serde(default)]
    pub medication_type: Option<String>,
    pub recorded_at: DateTime<Utc>,
    #[serde(skip)]
    pub temp_id: Option<Uuid>,
    #[serde(skip)]
    pub is_optimistic: bool,
    #[serde(skip)]
    pub entry_tag: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub admission_id: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub infusion_rate: i32,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub temp_id: Option<Uuid>,
    #[serde(skip)]
    pub is_optimistic: bool,
    #[serde(skip)]
    pub entry_tag: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealRequest {
    #[serde(default)]
    pub id: Option<i64>,
    pub admission_id: String,
    pub request_type: String,
    #[serde(default)]
    pub meal_date: Option<NaiveDate>,
    #[serde(default)]
    pub meal_time: Option<MealSlot>,
    #[serde(default)]
    pub pediatric_meal_type: Option<String>,
    #[serde(default)]
    pub guardian_meal_type: Option<String>,
    #[serde(default)]
    pub room_note: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub temp_id: Option<Uuid>,
    #[serde(skip)]
    pub is_optimistic: bool,
    #[serde(skip)]
    pub entry_tag: u64,
}

impl MealRequest {
    /// The backend upserts meals on (admission, date, slot); broadcast
    /// payloads carry no row id, so merges key on the same triple.
    pub fn slot_key(&self) -> Option<(NaiveDate, MealSlot)> {
        Some((self.meal_date?, self.meal_time?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSchedule {
    #[serde(default)]
    pub id: Option<i64>,
    pub admission_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(skip)]
    pub temp_id: Option<Uuid>,
    #[serde(skip)]
    pub is_optimistic: bool,
    #[serde(skip)]
    pub entry_tag: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRequest {
    #[serde(default)]
    pub id: Option<i64>,
    pub admission_id: String,
    #[serde(default)]
    pub request_items: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub is_optimistic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionMeta {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub room_number: String,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub check_in_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One row of the station snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionSummary {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub room_number: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub latest_iv: Option<LatestIv>,
    #[serde(default)]
    pub latest_temp: Option<f64>,
    #[serde(default)]
    pub had_fever_in_6h: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestIv {
    pub infusion_rate: i32,
}

/// Full admission dashboard payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub admission: AdmissionMeta,
    #[serde(default)]
    pub vitals: Vec<Vital>,
    #[serde(default)]
    pub iv_records: Vec<IvRecord>,
    #[serde(default)]
    pub meals: Vec<MealRequest>,
    #[serde(default)]
    pub exam_schedules: Vec<ExamSchedule>,
    #[serde(default)]
    pub document_requests: Vec<DocumentRequest>,
}

/// One bed card on the station console.
#[derive(Debug, Clone, PartialEq)]
pub struct Bed {
    pub room: String,
    pub admission_id: Option<String>,
    pub patient_name: String,
    pub temperature: f64,
    pub infusion_rate: i32,
    pub fever: bool,
    pub had_fever_in_6h: bool,
    pub token: Option<String>,
}

impl Bed {
    pub fn vacant(room: &str) -> Self {
        Self {
            room: room.to_string(),
            admission_id: None,
            patient_name: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            infusion_rate: DEFAULT_INFUSION_RATE,
            fever: false,
            had_fever_in_6h: false,
            token: None,
        }
    }

    pub fn occupied(&self) -> bool {
        self.admission_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Meal,
    Document,
}

/// Station-side alert strip entry, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub room: String,
    pub kind: NotificationKind,
    pub content: String,
}

/// Most recent IV photo upload seen by the station.
#[derive(Debug, Clone, PartialEq)]
pub struct LastUploadedIv {
    pub admission_id: String,
    pub photo_url: String,
}

/// Station-wide view model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StationView {
    pub beds: Vec<Bed>,
    pub notifications: Vec<Notification>,
    pub last_uploaded_iv: Option<LastUploadedIv>,
}

impl StationView {
    pub fn with_ward_layout() -> Self {
        Self {
            beds: ROOM_NUMBERS.iter().map(|room| Bed::vacant(room)).collect(),
            notifications: Vec::new(),
            last_uploaded_iv: None,
        }
    }

    pub fn bed_mut(&mut self, room: &str) -> Option<&mut Bed> {
        self.beds.iter_mut().find(|bed| bed.room == room)
    }

    pub fn bed_for_admission_mut(&mut self, admission_id: &str) -> Option<&mut Bed> {
        self.beds
            .iter_mut()
            .find(|bed| bed.admission_id.as_deref() == Some(admission_id))
    }
}

/// Single-admission view model. Vitals and IV records are newest-first,
/// meals and exam schedules chronological.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdmissionView {
    pub admission: Option<AdmissionMeta>,
    pub vitals: Vec<Vital>,
    pub iv_records: Vec<IvRecord>,
    pub meals: Vec<MealRequest>,
    pub exam_schedules: Vec<ExamSchedule>,
    pub document_requests: Vec<DocumentRequest>,
}

impl AdmissionView {
    pub fn sort_vitals(&mut self) {
        self.vitals
            .sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
    }

    pub fn sort_iv_records(&mut self) {
        self.iv_records
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    pub fn sort_meals(&mut self) {
        self.meals
            .sort_by(|a, b| a.slot_key().cmp(&b.slot_key()).then(a.id.cmp(&b.id)));
    }

    pub fn sort_exam_schedules(&mut self) {
        self.exam_schedules
            .sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
    }

    pub fn sort_document_requests(&mut self) {
        self.document_requests
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

/// Per-scope view model owned exclusively by that scope's session.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewModel {
    Station(StationView),
    Admission(AdmissionView),
}

impl ViewModel {
    pub fn empty_for(scope: &Scope) -> Self {
        match scope {
            Scope::Station => ViewModel::Station(StationView::with_ward_layout()),
            Scope::Admission { .. } => ViewModel::Admission(AdmissionView::default()),
        }
    }

    pub fn as_station(&self) -> Option<&StationView> {
        match self {
            ViewModel::Station(view) => Some(view),
            ViewModel::Admission(_) => None,
        }
    }

    pub fn as_admission(&self) -> Option<&AdmissionView> {
        match self {
            ViewModel::Station(_) => None,
            ViewModel::Admission(view) => Some(view),
        }
    }
}

pub fn fever_status(temperature: f64, had_fever_in_6h: bool) -> bool {
    temperature >= FEVER_THRESHOLD || had_fever_in_6h
}
