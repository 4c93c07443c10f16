// crates/exam-catalog-core/src/runtime/cache.rs
// ============================================================================
// Module: Exam Catalog Read Cache
// Description: TTL read cache with generation-guarded population.
// Purpose: Serve repeated reads without letting stale loads outlive writes.
// Dependencies: parking_lot
// ============================================================================

//! ## Overview
//! [`ReadCache`] maps string keys to shared, type-erased values that expire
//! after a fixed time-to-live. Every invalidation bumps a generation counter;
//! a reader captures the generation before querying the store and populates
//! only if no invalidation happened meanwhile
//! ([`ReadCache::insert_if_current`]). A read that raced a committed write
//! therefore never caches the pre-write state.
//!
//! Keys are built by [`keys`] so invalidation scopes and lookups agree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use parking_lot::RwLock;

use crate::interfaces::InvalidationScope;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Entry count above which inserts sweep expired entries.
const SWEEP_THRESHOLD: usize = 1_024;

/// Key families holding nested reads below a university.
const NESTED_FAMILIES: [&str; 5] = [
    keys::MAJORS,
    keys::ADMISSION_SCHEDULES,
    keys::ADMISSION_INFOS,
    keys::TEST_TYPES,
    keys::SUBJECTS,
];

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Cache key builders.
pub mod keys {
    use crate::core::AdmissionInfoId;
    use crate::core::AdmissionScheduleId;
    use crate::core::DepartmentId;
    use crate::core::FilterCategory;
    use crate::core::MajorId;
    use crate::core::SubjectId;
    use crate::core::TestTypeId;
    use crate::core::UniversityId;
    use crate::interfaces::Page;

    /// University listing prefix.
    pub const UNIVERSITIES_ALL: &str = "universities:all";
    /// University search prefix.
    pub const UNIVERSITIES_SEARCH: &str = "universities:search:";
    /// Department family.
    pub const DEPARTMENTS: &str = "departments:";
    /// Major family.
    pub const MAJORS: &str = "majors:";
    /// Admission schedule family.
    pub const ADMISSION_SCHEDULES: &str = "admission_schedules:";
    /// Admission info family.
    pub const ADMISSION_INFOS: &str = "admission_infos:";
    /// Test type family.
    pub const TEST_TYPES: &str = "test_types:";
    /// Subject family.
    pub const SUBJECTS: &str = "subjects:";
    /// Filter option family.
    pub const FILTER_OPTIONS: &str = "filter_options:";

    /// Key for one page of the university listing.
    #[must_use]
    pub fn universities_page(page: Page) -> String {
        format!("{UNIVERSITIES_ALL}?offset={}&limit={}", page.offset, page.limit)
    }

    /// Key for one university.
    #[must_use]
    pub fn university(id: UniversityId) -> String {
        format!("universities:{id}")
    }

    /// Key for a search query.
    #[must_use]
    pub fn search(query: &str) -> String {
        format!("{UNIVERSITIES_SEARCH}{query}")
    }

    /// Prefix for every department read under a university.
    #[must_use]
    pub fn departments_of(university_id: UniversityId) -> String {
        format!("{DEPARTMENTS}{university_id}:")
    }

    /// Key for one department.
    #[must_use]
    pub fn department(university_id: UniversityId, department_id: DepartmentId) -> String {
        format!("{DEPARTMENTS}{university_id}:{department_id}")
    }

    /// Key for one major.
    #[must_use]
    pub fn major(department_id: DepartmentId, major_id: MajorId) -> String {
        format!("{MAJORS}{department_id}:{major_id}")
    }

    /// Key for one admission schedule.
    #[must_use]
    pub fn admission_schedule(major_id: MajorId, schedule_id: AdmissionScheduleId) -> String {
        format!("{ADMISSION_SCHEDULES}{major_id}:{schedule_id}")
    }

    /// Key for one admission info.
    #[must_use]
    pub fn admission_info(schedule_id: AdmissionScheduleId, info_id: AdmissionInfoId) -> String {
        format!("{ADMISSION_INFOS}{schedule_id}:{info_id}")
    }

    /// Key for one test type.
    #[must_use]
    pub fn test_type(schedule_id: AdmissionScheduleId, test_type_id: TestTypeId) -> String {
        format!("{TEST_TYPES}{schedule_id}:{test_type_id}")
    }

    /// Key for one subject.
    #[must_use]
    pub fn subject(test_type_id: TestTypeId, subject_id: SubjectId) -> String {
        format!("{SUBJECTS}{test_type_id}:{subject_id}")
    }

    /// Key for a filter option listing.
    #[must_use]
    pub fn filter_options(category: Option<FilterCategory>) -> String {
        match category {
            Some(category) => format!("{FILTER_OPTIONS}{}", category.as_str()),
            None => format!("{FILTER_OPTIONS}all"),
        }
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Cached value with its expiry.
#[derive(Clone)]
struct CacheEntry {
    /// Shared value.
    value: Arc<dyn Any + Send + Sync>,
    /// Instant after which the entry is ignored.
    expires_at: Instant,
}

/// Mutable cache state.
#[derive(Default)]
struct CacheState {
    /// Bumped by every invalidation.
    generation: u64,
    /// Entries by key.
    entries: BTreeMap<String, CacheEntry>,
}

/// TTL read cache shared by all request handlers.
pub struct ReadCache {
    /// Entry lifetime.
    ttl: Duration,
    /// Guarded state; readers take the lock recursively so writers never
    /// starve lookups.
    state: RwLock<CacheState>,
}

impl std::fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read_recursive();
        f.debug_struct("ReadCache")
            .field("ttl", &self.ttl)
            .field("generation", &state.generation)
            .field("entries", &state.entries.len())
            .finish()
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl ReadCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Returns the entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.read_recursive().generation
    }

    /// Returns the number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read_recursive().entries.len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a live entry of type `T`.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let state = self.state.read_recursive();
        let entry = state.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Arc::clone(&entry.value).downcast::<T>().ok()
    }

    /// Stores `value` if no invalidation happened since `generation` was
    /// observed. Returns whether the value was stored.
    pub fn insert_if_current<T>(&self, key: String, value: Arc<T>, generation: u64) -> bool
    where
        T: Any + Send + Sync,
    {
        let mut state = self.state.write();
        if state.generation != generation {
            return false;
        }
        let now = Instant::now();
        if state.entries.len() >= SWEEP_THRESHOLD {
            state.entries.retain(|_, entry| entry.expires_at > now);
        }
        let Some(expires_at) = now.checked_add(self.ttl) else {
            return false;
        };
        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at,
            },
        );
        true
    }

    /// Drops every entry the scope covers and advances the generation.
    pub fn invalidate(&self, scope: InvalidationScope) {
        let mut state = self.state.write();
        state.generation = state.generation.wrapping_add(1);
        match scope {
            InvalidationScope::All => state.entries.clear(),
            InvalidationScope::FilterOptions => {
                state.entries.retain(|key, _| !key.starts_with(keys::FILTER_OPTIONS));
            }
            InvalidationScope::University(university_id) => {
                let exact = keys::university(university_id);
                let departments = keys::departments_of(university_id);
                state.entries.retain(|key, _| {
                    let nested = NESTED_FAMILIES.iter().any(|family| key.starts_with(family));
                    !(key.starts_with(keys::UNIVERSITIES_ALL)
                        || key.starts_with(keys::UNIVERSITIES_SEARCH)
                        || *key == exact
                        || key.starts_with(&departments)
                        || nested)
                });
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DepartmentId;
    use crate::core::FilterCategory;
    use crate::core::MajorId;
    use crate::core::UniversityId;
    use crate::interfaces::Page;

    fn populate(cache: &ReadCache, key: String) {
        let generation = cache.generation();
        assert!(cache.insert_if_current(key, Arc::new(1_u32), generation));
    }

    #[test]
    fn stale_generation_is_not_cached() {
        let cache = ReadCache::default();
        let observed = cache.generation();
        cache.invalidate(InvalidationScope::All);
        assert!(!cache.insert_if_current(keys::university(UniversityId::new(1)), Arc::new(1_u32), observed));
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = ReadCache::new(Duration::ZERO);
        populate(&cache, keys::university(UniversityId::new(1)));
        assert!(cache.get::<u32>(&keys::university(UniversityId::new(1))).is_none());
    }

    #[test]
    fn type_mismatch_is_a_miss() {
        let cache = ReadCache::default();
        populate(&cache, "universities:1".to_string());
        assert!(cache.get::<String>("universities:1").is_none());
        assert_eq!(cache.get::<u32>("universities:1").as_deref(), Some(&1));
    }

    #[test]
    fn university_scope_spares_other_universities_and_filters() {
        let cache = ReadCache::default();
        let one = UniversityId::new(1);
        let two = UniversityId::new(2);
        populate(&cache, keys::universities_page(Page::default()));
        populate(&cache, keys::university(one));
        populate(&cache, keys::university(two));
        populate(&cache, keys::search("tokyo"));
        populate(&cache, keys::department(one, DepartmentId::new(10)));
        populate(&cache, keys::department(two, DepartmentId::new(20)));
        populate(&cache, keys::major(DepartmentId::new(10), MajorId::new(100)));
        populate(&cache, keys::filter_options(Some(FilterCategory::Region)));

        cache.invalidate(InvalidationScope::University(one));

        assert!(cache.get::<u32>(&keys::universities_page(Page::default())).is_none());
        assert!(cache.get::<u32>(&keys::university(one)).is_none());
        assert!(cache.get::<u32>(&keys::search("tokyo")).is_none());
        assert!(cache.get::<u32>(&keys::department(one, DepartmentId::new(10))).is_none());
        assert!(cache.get::<u32>(&keys::major(DepartmentId::new(10), MajorId::new(100))).is_none());
        assert!(cache.get::<u32>(&keys::university(two)).is_some());
        assert!(cache.get::<u32>(&keys::department(two, DepartmentId::new(20))).is_some());
        assert!(cache.get::<u32>(&keys::filter_options(Some(FilterCategory::Region))).is_some());
    }

    #[test]
    fn university_scope_does_not_match_id_prefixes() {
        let cache = ReadCache::default();
        populate(&cache, keys::university(UniversityId::new(12)));
        populate(&cache, keys::department(UniversityId::new(12), DepartmentId::new(1)));
        cache.invalidate(InvalidationScope::University(UniversityId::new(1)));
        assert!(cache.get::<u32>(&keys::university(UniversityId::new(12))).is_some());
        assert!(
            cache.get::<u32>(&keys::department(UniversityId::new(12), DepartmentId::new(1))).is_some()
        );
    }

    #[test]
    fn filter_scope_only_drops_filter_listings() {
        let cache = ReadCache::default();
        populate(&cache, keys::filter_options(None));
        populate(&cache, keys::university(UniversityId::new(1)));
        cache.invalidate(InvalidationScope::FilterOptions);
        assert!(cache.get::<u32>(&keys::filter_options(None)).is_none());
        assert!(cache.get::<u32>(&keys::university(UniversityId::new(1))).is_some());
    }
}
