//! In-memory mirror of the remote store.
//!
//! Reads are served from the cache. Writes are staged in the cache, sent to
//! the remote store once, then confirmed or rolled back depending on the
//! answer. The cache lock is never held across a remote call.

pub mod collection;

use crate::checkin::Evaluation;
use crate::model::{
    announcement::Announcement,
    attendance::{AttendanceKey, AttendanceRecord, AttendanceStatus},
    course::Course,
    entry::PassportEntry,
    settings::{CloudConfig, SystemSettings, default_categories},
    user::User,
};
use crate::remote::{Credentials, DataType, RemoteError, ScriptClient, Snapshot};
use chrono::{DateTime, NaiveDate, Utc};
use collection::{Collection, Insert, Keyed, Single, Staged, StagedValue, Synced};
use serde::Serialize;
use serde_json::json;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error("no portal account is registered for {0}")]
    UnknownUser(String),
}

impl StoreError {
    fn not_found(kind: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl Keyed for User {
    type Key = String;
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for Course {
    type Key = String;
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for PassportEntry {
    type Key = String;
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for Announcement {
    type Key = String;
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for AttendanceRecord {
    type Key = AttendanceKey;
    fn key(&self) -> AttendanceKey {
        self.session_key()
    }
}

/// Result of writing a GPS check-in.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckInOutcome {
    Recorded(AttendanceRecord),
    /// A social worker already set this session by hand; nothing was written.
    ManualKept(AttendanceRecord),
}

#[derive(Debug, Default, Clone)]
pub struct AttendanceFilter {
    pub course_id: Option<String>,
    pub student_id: Option<String>,
    pub session_date: Option<NaiveDate>,
}

impl AttendanceFilter {
    fn matches(&self, r: &AttendanceRecord) -> bool {
        self.course_id.as_ref().is_none_or(|c| &r.course_id == c)
            && self.student_id.as_ref().is_none_or(|s| &r.student_id == s)
            && self.session_date.is_none_or(|d| r.session_date == d)
    }
}

#[derive(Debug)]
struct Cache {
    users: Collection<User>,
    courses: Collection<Course>,
    entries: Collection<PassportEntry>,
    announcements: Collection<Announcement>,
    attendance: Collection<AttendanceRecord>,
    categories: Single<Vec<String>>,
    settings: Single<SystemSettings>,
    cloud_config: Single<CloudConfig>,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            users: Collection::default(),
            courses: Collection::default(),
            entries: Collection::default(),
            announcements: Collection::default(),
            attendance: Collection::default(),
            categories: Single::new(default_categories()),
            settings: Single::new(SystemSettings::default()),
            cloud_config: Single::new(CloudConfig::default()),
        }
    }
}

// collection selectors for the generic write path
impl Cache {
    fn users(&mut self) -> &mut Collection<User> {
        &mut self.users
    }
    fn courses(&mut self) -> &mut Collection<Course> {
        &mut self.courses
    }
    fn entries(&mut self) -> &mut Collection<PassportEntry> {
        &mut self.entries
    }
    fn announcements(&mut self) -> &mut Collection<Announcement> {
        &mut self.announcements
    }
    fn attendance(&mut self) -> &mut Collection<AttendanceRecord> {
        &mut self.attendance
    }
    fn categories(&mut self) -> &mut Single<Vec<String>> {
        &mut self.categories
    }
    fn settings(&mut self) -> &mut Single<SystemSettings> {
        &mut self.settings
    }
    fn cloud_config(&mut self) -> &mut Single<CloudConfig> {
        &mut self.cloud_config
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub struct PortalStore {
    remote: ScriptClient,
    /// Account used for writes made on behalf of signed-in users
    service: Credentials,
    cache: RwLock<Cache>,
}

impl PortalStore {
    pub fn new(remote: ScriptClient, service: Credentials) -> Self {
        Self {
            remote,
            service,
            cache: RwLock::new(Cache::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Cache> {
        self.cache.read().expect("portal cache poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Cache> {
        self.cache.write().expect("portal cache poisoned")
    }

    /* =========================
    Hydration
    ========================= */

    /// Replaces the cache with a remote snapshot.
    ///
    /// `keep_email` names a user known locally who must survive even when the
    /// snapshot lags behind (freshly registered accounts).
    pub fn hydrate(&self, snapshot: Snapshot, keep_email: Option<&str>) {
        let mut cache = self.write();

        let lagging = keep_email.and_then(|email| {
            cache.users.items().find(|u| u.has_email(email)).cloned()
        });

        let mut users = snapshot.users.unwrap_or_default();
        if let Some(local) = lagging {
            if !users.iter().any(|u| u.id == local.id) {
                info!(user_id = %local.id, "User missing from snapshot, keeping local copy");
                users.push(local);
            }
        }

        cache.users.replace_all(users);
        cache.courses.replace_all(snapshot.courses.unwrap_or_default());
        cache.entries.replace_all(snapshot.entries.unwrap_or_default());
        cache
            .announcements
            .replace_all(snapshot.announcements.unwrap_or_default());
        cache
            .attendance
            .replace_all(snapshot.attendance.unwrap_or_default());
        cache
            .categories
            .replace(snapshot.categories.unwrap_or_else(default_categories));
        cache
            .settings
            .replace(snapshot.settings.unwrap_or_default());
        cache
            .cloud_config
            .replace(snapshot.cloud_config.unwrap_or_default());

        info!(
            users = cache.users.len(),
            courses = cache.courses.len(),
            attendance = cache.attendance.len(),
            "Cache hydrated"
        );
    }

    /// Reloads everything with the service account.
    pub async fn sync(&self) -> Result<(), StoreError> {
        let snapshot = self.remote.login(&self.service).await?;
        self.hydrate(snapshot, None);
        Ok(())
    }

    /* =========================
    Accounts
    ========================= */

    /// Signs a user in against the remote store and refreshes the cache.
    ///
    /// `bootstrap_admin` is true when the credentials belong to the configured
    /// administrator; that account is recreated if the remote store lost it.
    pub async fn authenticate(
        &self,
        creds: &Credentials,
        bootstrap_admin: bool,
    ) -> Result<User, StoreError> {
        let email = creds.user_id.trim();
        let mut login = self.remote.login(creds).await;

        if login.is_err() && bootstrap_admin {
            warn!("Administrator rejected by remote store, seeding account");
            let admin = User::bootstrap_admin(email);

            match self.remote.save(creds, DataType::User, &admin).await {
                Ok(()) => login = self.remote.login(creds).await,
                Err(e) => {
                    warn!(error = %e, "Administrator seeding failed, signing in locally");
                    // never written remotely, so it stays pending
                    let _ = self.write().users.stage_upsert(admin.clone(), Insert::Back);
                    return Ok(admin);
                }
            }
        }

        self.hydrate(login?, Some(email));

        if let Some(user) = self.find_user_by_email(email) {
            return Ok(user);
        }

        if bootstrap_admin {
            warn!("Administrator missing from snapshot, adding unconfirmed account");
            let admin = User::bootstrap_admin(email);
            // not written remotely, so it stays pending
            let _ = self.write().users.stage_upsert(admin.clone(), Insert::Back);
            return Ok(admin);
        }

        Err(StoreError::UnknownUser(email.to_string()))
    }

    /// Creates an account with its own credentials.
    pub async fn register(&self, user: User, password: &str) -> Result<User, StoreError> {
        let creds = Credentials::new(user.email.clone(), password);
        self.remote.save(&creds, DataType::User, &user).await?;
        self.write().users.upsert_confirmed(user.clone(), Insert::Back);
        Ok(user)
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.read().users.items().find(|u| u.has_email(email)).cloned()
    }

    pub fn email_taken(&self, email: &str) -> bool {
        self.find_user_by_email(email).is_some()
    }

    pub fn user_emails(&self) -> Vec<String> {
        self.read().users.items().map(|u| u.email.to_lowercase()).collect()
    }

    pub fn get_user(&self, id: &str) -> Option<Synced<User>> {
        self.read().users.get(&id.to_string())
    }

    pub fn list_users(&self) -> Vec<Synced<User>> {
        self.read().users.list(|_| true)
    }

    pub async fn save_user(&self, user: User) -> Result<User, StoreError> {
        self.upsert(Cache::users, DataType::User, user, Insert::Back).await
    }

    /* =========================
    Courses
    ========================= */

    /// All courses; the demo course stands in while none are stored.
    pub fn list_courses(&self, today: NaiveDate) -> Vec<Synced<Course>> {
        let cache = self.read();
        if cache.courses.is_empty() {
            return vec![Synced::confirmed(Course::demo(today))];
        }
        cache.courses.list(|_| true)
    }

    pub fn get_course(&self, id: &str, today: NaiveDate) -> Option<Synced<Course>> {
        self.list_courses(today)
            .into_iter()
            .find(|c| c.item.id == id)
    }

    pub async fn save_course(&self, course: Course) -> Result<Course, StoreError> {
        self.upsert(Cache::courses, DataType::Course, course, Insert::Back)
            .await
    }

    pub async fn delete_course(&self, id: &str) -> Result<(), StoreError> {
        self.remove(Cache::courses, DataType::DeleteCourse, "course", id)
            .await
    }

    /* =========================
    Journal entries
    ========================= */

    pub fn list_entries(&self, student_id: Option<&str>) -> Vec<Synced<PassportEntry>> {
        self.read()
            .entries
            .list(|e| student_id.is_none_or(|s| e.student_id == s))
    }

    pub fn get_entry(&self, id: &str) -> Option<Synced<PassportEntry>> {
        self.read().entries.get(&id.to_string())
    }

    pub async fn save_entry(&self, entry: PassportEntry) -> Result<PassportEntry, StoreError> {
        self.upsert(Cache::entries, DataType::Entry, entry, Insert::Front)
            .await
    }

    pub async fn delete_entry(&self, id: &str) -> Result<(), StoreError> {
        self.remove(Cache::entries, DataType::DeleteEntry, "entry", id)
            .await
    }

    /* =========================
    Announcements
    ========================= */

    pub fn list_announcements(&self) -> Vec<Synced<Announcement>> {
        self.read().announcements.list(|_| true)
    }

    pub async fn save_announcement(
        &self,
        announcement: Announcement,
    ) -> Result<Announcement, StoreError> {
        self.upsert(
            Cache::announcements,
            DataType::Announcement,
            announcement,
            Insert::Front,
        )
        .await
    }

    pub async fn delete_announcement(&self, id: &str) -> Result<(), StoreError> {
        self.remove(
            Cache::announcements,
            DataType::DeleteAnnouncement,
            "announcement",
            id,
        )
        .await
    }

    /* =========================
    Attendance
    ========================= */

    pub fn list_attendance(&self, filter: &AttendanceFilter) -> Vec<Synced<AttendanceRecord>> {
        self.read().attendance.list(|r| filter.matches(r))
    }

    pub fn get_attendance(&self, key: &AttendanceKey) -> Option<Synced<AttendanceRecord>> {
        self.read().attendance.get(key)
    }

    /// Writes the result of an accepted GPS check-in.
    ///
    /// A record set by hand is never replaced by a check-in.
    pub async fn record_check_in(
        &self,
        course_id: &str,
        student_id: &str,
        evaluation: &Evaluation,
        at: DateTime<Utc>,
    ) -> Result<CheckInOutcome, StoreError> {
        let key = AttendanceKey {
            course_id: course_id.to_string(),
            student_id: student_id.to_string(),
            session_date: evaluation.session_date,
        };

        let (record, staged) = {
            let mut cache = self.write();
            let existing = cache.attendance.find(&key).cloned();

            if let Some(existing) = existing.as_ref().filter(|r| r.is_manual) {
                info!(course_id, student_id, "Manual attendance kept, check-in ignored");
                return Ok(CheckInOutcome::ManualKept(existing.clone()));
            }

            let record = AttendanceRecord {
                id: existing.map(|r| r.id).unwrap_or_else(new_id),
                course_id: key.course_id.clone(),
                student_id: key.student_id.clone(),
                check_in_time: at,
                session_date: key.session_date,
                status: evaluation.status,
                is_manual: false,
            };
            let staged = cache.attendance.stage_upsert(record.clone(), Insert::Back);
            (record, staged)
        };

        let outcome = self
            .remote
            .save(&self.service, DataType::Attendance, &record)
            .await;
        self.settle(Cache::attendance, staged, outcome)?;

        Ok(CheckInOutcome::Recorded(record))
    }

    /// Sets a student's status for one session by hand, whatever is stored.
    pub async fn override_attendance(
        &self,
        key: AttendanceKey,
        status: AttendanceStatus,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError> {
        let (record, staged) = {
            let mut cache = self.write();

            if cache.users.find(&key.student_id).is_none() {
                return Err(StoreError::not_found("student", &key.student_id));
            }
            if !cache.courses.is_empty() && cache.courses.find(&key.course_id).is_none() {
                return Err(StoreError::not_found("course", &key.course_id));
            }

            let existing = cache.attendance.find(&key).cloned();
            let record = AttendanceRecord {
                id: existing.as_ref().map(|r| r.id.clone()).unwrap_or_else(new_id),
                check_in_time: existing.as_ref().map(|r| r.check_in_time).unwrap_or(at),
                course_id: key.course_id,
                student_id: key.student_id,
                session_date: key.session_date,
                status,
                is_manual: true,
            };
            let staged = cache.attendance.stage_upsert(record.clone(), Insert::Back);
            (record, staged)
        };

        let outcome = self
            .remote
            .save(&self.service, DataType::Attendance, &record)
            .await;
        self.settle(Cache::attendance, staged, outcome)?;

        Ok(record)
    }

    /* =========================
    Settings
    ========================= */

    pub fn settings(&self) -> Synced<SystemSettings> {
        self.read().settings.get()
    }

    pub async fn save_settings(&self, settings: SystemSettings) -> Result<(), StoreError> {
        self.set(Cache::settings, DataType::Settings, settings.clone(), &settings)
            .await
    }

    pub fn categories(&self) -> Synced<Vec<String>> {
        self.read().categories.get()
    }

    pub async fn save_categories(&self, categories: Vec<String>) -> Result<(), StoreError> {
        let payload = json!({ "items": categories });
        self.set(Cache::categories, DataType::Categories, categories, &payload)
            .await
    }

    pub fn cloud_config(&self) -> Synced<CloudConfig> {
        self.read().cloud_config.get()
    }

    pub async fn save_cloud_config(&self, config: CloudConfig) -> Result<(), StoreError> {
        self.set(Cache::cloud_config, DataType::CloudConfig, config.clone(), &config)
            .await
    }

    /* =========================
    Write path
    ========================= */

    async fn upsert<T>(
        &self,
        select: fn(&mut Cache) -> &mut Collection<T>,
        data_type: DataType,
        item: T,
        at: Insert,
    ) -> Result<T, StoreError>
    where
        T: Keyed + Clone + Serialize,
    {
        let staged = select(&mut self.write()).stage_upsert(item.clone(), at);
        let outcome = self.remote.save(&self.service, data_type, &item).await;
        self.settle(select, staged, outcome)?;
        Ok(item)
    }

    async fn remove<T>(
        &self,
        select: fn(&mut Cache) -> &mut Collection<T>,
        data_type: DataType,
        kind: &'static str,
        id: &str,
    ) -> Result<(), StoreError>
    where
        T: Keyed<Key = String> + Clone,
    {
        let staged = select(&mut self.write())
            .stage_remove(&id.to_string())
            .ok_or_else(|| StoreError::not_found(kind, id))?;
        let outcome = self
            .remote
            .save(&self.service, data_type, &json!({ "id": id }))
            .await;
        self.settle(select, staged, outcome)
    }

    async fn set<T, P>(
        &self,
        select: fn(&mut Cache) -> &mut Single<T>,
        data_type: DataType,
        value: T,
        payload: &P,
    ) -> Result<(), StoreError>
    where
        T: Clone,
        P: Serialize,
    {
        let staged: StagedValue<T> = select(&mut self.write()).stage(value);
        let outcome = self.remote.save(&self.service, data_type, payload).await;

        let mut cache = self.write();
        let single = select(&mut cache);
        match outcome {
            Ok(()) => {
                single.confirm(&staged);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, data_type = data_type.as_ref(), "Remote write failed, restoring cached value");
                single.rollback(staged);
                Err(e.into())
            }
        }
    }

    fn settle<T: Keyed + Clone>(
        &self,
        select: fn(&mut Cache) -> &mut Collection<T>,
        staged: Staged<T>,
        outcome: Result<(), RemoteError>,
    ) -> Result<(), StoreError> {
        let mut cache = self.write();
        let collection = select(&mut cache);
        match outcome {
            Ok(()) => {
                collection.confirm(&staged);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Remote write failed, rolling back cached item");
                collection.rollback(staged);
                Err(e.into())
            }
        }
    }
}
