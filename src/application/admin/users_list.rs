//! State and behavior of the admin users list.
//!
//! The controller owns the list's filter and page state, turns it into a query key and
//! keeps one [`QueryObserver`] pointed at that key. Search input is debounced; a new
//! committed search or a new status filter always resets the page to 1 before the next
//! key is computed. Writes go through [`Mutation`]s whose success hooks invalidate the
//! whole `users` family, so every cached page refetches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::application::admin::users::{
    AdminUserError, AdminUserService, CreateUserCommand, UpdateUserCommand, UserInput,
};
use crate::application::notify::{NotificationKind, Notifier};
use crate::application::pagination::{PageRequest, Paginated, clamp_page};
use crate::application::repos::UserQueryFilter;
use crate::cache::{
    Debouncer, Mutation, QueryClient, QueryFn, QueryKey, QueryObserver, QueryOptions, QueryState,
    query_fn, resource_family,
};
use crate::domain::entities::UserRecord;
use crate::domain::types::{StatusFilter, UserRole, UserStatus};

const SOURCE: &str = "application::admin::users_list";

pub const USERS_RESOURCE: &str = "users";
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

pub type UserPage = Paginated<UserRecord>;

/// Cache key of one users list page: `("users", page, page_size, search, status)`.
pub fn users_list_key(page: u32, page_size: u32, search: &str, status: StatusFilter) -> QueryKey {
    QueryKey::resource(USERS_RESOURCE)
        .with(page)
        .with(page_size)
        .with(search)
        .with(status.as_str())
}

pub struct UserListDeps {
    pub client: QueryClient<UserPage>,
    pub service: AdminUserService,
    pub notifier: Arc<dyn Notifier>,
    pub page_size: u32,
    pub search_debounce: Duration,
}

/// Values of the create/edit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserForm {
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
}

impl Default for UserForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            role: UserRole::User,
            status: UserStatus::Active,
        }
    }
}

impl From<&UserRecord> for UserForm {
    fn from(user: &UserRecord) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            status: user.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserTable {
    pub rows: Vec<UserRecord>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
    /// Rows are visible while a fetch runs.
    pub refreshing: bool,
}

impl UserTable {
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// What the list area should display.
#[derive(Debug, Clone, PartialEq)]
pub enum UserListView {
    Skeleton,
    Error { message: String },
    Empty { refreshing: bool },
    Populated(UserTable),
}

pub struct UserListController {
    client: QueryClient<UserPage>,
    service: AdminUserService,
    page: u32,
    page_size: u32,
    search_term: String,
    applied_search: String,
    status_filter: StatusFilter,
    search: Debouncer<String>,
    search_commits: watch::Receiver<String>,
    query: QueryObserver<UserPage>,
    save: Mutation<UserInput, UserRecord, AdminUserError>,
    remove: Mutation<UserRecord, (), AdminUserError>,
    is_form_open: bool,
    editing: Option<UserRecord>,
    is_delete_open: bool,
    pending_deletion: Option<UserRecord>,
}

impl UserListController {
    /// Build the controller and start loading the first page.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(deps: UserListDeps) -> Self {
        let UserListDeps {
            client,
            service,
            notifier,
            page_size,
            search_debounce,
        } = deps;
        let page_size = page_size.max(1);

        let search = Debouncer::new(String::new(), search_debounce);
        let search_commits = search.subscribe();

        let key = users_list_key(1, page_size, "", StatusFilter::All);
        let fetch = list_fetch(&service, UserQueryFilter::default(), PageRequest::new(1, page_size));
        let query = client.observe(key, fetch, QueryOptions::keep_previous_data());

        let save = save_mutation(&client, &service, &notifier);
        let remove = remove_mutation(&client, &service, &notifier);

        Self {
            client,
            service,
            page: 1,
            page_size,
            search_term: String::new(),
            applied_search: String::new(),
            status_filter: StatusFilter::All,
            search,
            search_commits,
            query,
            save,
            remove,
            is_form_open: false,
            editing: None,
            is_delete_open: false,
            pending_deletion: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Raw search input, before debouncing.
    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    /// Search term the current query uses.
    pub fn applied_search(&self) -> &str {
        &self.applied_search
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.status_filter
    }

    pub fn current_key(&self) -> &QueryKey {
        self.query.key()
    }

    pub fn query_state(&self) -> QueryState<UserPage> {
        self.query.state()
    }

    pub fn client(&self) -> &QueryClient<UserPage> {
        &self.client
    }

    pub fn is_form_open(&self) -> bool {
        self.is_form_open
    }

    pub fn editing(&self) -> Option<&UserRecord> {
        self.editing.as_ref()
    }

    pub fn is_delete_open(&self) -> bool {
        self.is_delete_open
    }

    pub fn pending_deletion(&self) -> Option<&UserRecord> {
        self.pending_deletion.as_ref()
    }

    pub fn is_saving(&self) -> bool {
        self.save.is_pending()
    }

    pub fn is_deleting(&self) -> bool {
        self.remove.is_pending()
    }

    // ========================================================================
    // Filters and paging
    // ========================================================================

    /// Record raw search input. The query follows once the input settles.
    pub fn set_search(&mut self, term: impl Into<String>) {
        let term = term.into();
        self.search_term = term.clone();
        self.search.push(term);
    }

    /// Apply pending search input immediately.
    pub fn flush_search(&mut self) {
        self.search.flush();
        self.sync();
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        if status == self.status_filter {
            return;
        }
        self.status_filter = status;
        self.reset_page("status filter changed");
        self.refresh();
    }

    pub fn set_page_size(&mut self, page_size: u32) {
        let page_size = page_size.max(1);
        if page_size == self.page_size {
            return;
        }
        self.page_size = page_size;
        self.reset_page("page size changed");
        self.refresh();
    }

    pub fn set_page(&mut self, page: u32) {
        let page = page.max(1);
        if page == self.page {
            return;
        }
        self.page = page;
        self.refresh();
    }

    pub fn next_page(&mut self) {
        let total_pages = self.known_total_pages();
        if total_pages.is_some_and(|total| self.page < total) {
            self.set_page(self.page + 1);
        }
    }

    pub fn previous_page(&mut self) {
        if self.page > 1 {
            self.set_page(self.page - 1);
        }
    }

    /// Re-run the current query regardless of freshness.
    pub fn retry(&self) {
        self.query.refetch();
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Fold committed search input and settled results back into the list state.
    ///
    /// A newly committed search resets the page to 1. A settled page beyond the last
    /// page (after a delete or a narrower filter) is clamped to the last page.
    pub fn sync(&mut self) {
        let committed = self.search.committed();
        if committed != self.applied_search {
            self.applied_search = committed;
            self.reset_page("search changed");
            self.refresh();
            return;
        }

        let state = self.query.state();
        if state.is_fetching || state.is_placeholder_data || !state.is_success() {
            return;
        }
        let Some(data) = state.data else {
            return;
        };
        let clamped = clamp_page(self.page, data.total_pages);
        if clamped != self.page {
            debug!(
                target_module = SOURCE,
                from = self.page,
                to = clamped,
                total_pages = data.total_pages,
                "Clamping page to last page"
            );
            self.page = clamped;
            self.refresh();
        }
    }

    /// Wait for a search commit or a change to the current query, then [`sync`](Self::sync).
    pub async fn wait_for_update(&mut self) {
        tokio::select! {
            _ = self.search_commits.changed() => {}
            _ = self.query.changed() => {}
        }
        self.sync();
    }

    /// Wait until no search input is pending and the current query has settled.
    pub async fn settle(&mut self) -> UserListView {
        loop {
            self.sync();
            if !self.search.is_pending() && !self.query.state().is_fetching {
                return self.view();
            }
            self.wait_for_update().await;
        }
    }

    pub fn view(&self) -> UserListView {
        let state = self.query.state();
        if let Some(error) = state.error.as_ref().filter(|_| state.is_error()) {
            return UserListView::Error {
                message: error.message().to_string(),
            };
        }
        if state.is_loading() && !state.is_placeholder_data {
            return UserListView::Skeleton;
        }
        let Some(data) = state.data else {
            return UserListView::Skeleton;
        };
        if data.is_empty() {
            return UserListView::Empty {
                refreshing: state.is_fetching,
            };
        }
        UserListView::Populated(UserTable {
            rows: data.data.clone(),
            page: self.page,
            page_size: self.page_size,
            total: data.total,
            total_pages: data.total_pages,
            refreshing: state.is_fetching,
        })
    }

    // ========================================================================
    // Create / edit
    // ========================================================================

    pub fn open_create(&mut self) {
        self.editing = None;
        self.is_form_open = true;
        self.save.reset();
    }

    pub fn open_edit(&mut self, user: UserRecord) {
        self.editing = Some(user);
        self.is_form_open = true;
        self.save.reset();
    }

    pub fn close_form(&mut self) {
        self.is_form_open = false;
        self.editing = None;
    }

    /// Submit the form in its current mode. Closes it on success.
    pub async fn submit_form(&mut self, form: UserForm) -> Result<UserRecord, AdminUserError> {
        let input = match &self.editing {
            Some(user) => UserInput::Update(UpdateUserCommand {
                id: user.id,
                name: form.name,
                email: form.email,
                role: form.role,
                status: form.status,
            }),
            None => UserInput::Create(CreateUserCommand {
                name: form.name,
                email: form.email,
                role: form.role,
                status: form.status,
            }),
        };
        self.submit(input).await
    }

    pub async fn submit(&mut self, input: UserInput) -> Result<UserRecord, AdminUserError> {
        let saved = self.save.mutate(input).await?;
        self.close_form();
        Ok(saved)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    pub fn request_delete(&mut self, user: UserRecord) {
        self.pending_deletion = Some(user);
        self.is_delete_open = true;
        self.remove.reset();
    }

    pub fn cancel_delete(&mut self) {
        self.pending_deletion = None;
        self.is_delete_open = false;
    }

    /// Delete the user awaiting confirmation. The dialog stays open on failure.
    pub async fn confirm_delete(&mut self) -> Result<(), AdminUserError> {
        let Some(user) = self.pending_deletion.clone() else {
            return Err(AdminUserError::NotFound);
        };
        self.remove.mutate(user).await?;
        self.cancel_delete();
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn reset_page(&mut self, reason: &'static str) {
        if self.page != 1 {
            debug!(target_module = SOURCE, from = self.page, reason, "Resetting page");
        }
        self.page = 1;
    }

    fn known_total_pages(&self) -> Option<u32> {
        let state = self.query.state();
        if state.is_placeholder_data {
            return None;
        }
        state.data.map(|data| data.total_pages)
    }

    fn refresh(&mut self) {
        let key = users_list_key(
            self.page,
            self.page_size,
            &self.applied_search,
            self.status_filter,
        );
        let filter = UserQueryFilter::new(self.applied_search.clone(), self.status_filter);
        let fetch = list_fetch(
            &self.service,
            filter,
            PageRequest::new(self.page, self.page_size),
        );
        self.query.set_query(key, fetch);
    }
}

fn list_fetch(service: &AdminUserService, filter: UserQueryFilter, page: PageRequest) -> QueryFn<UserPage> {
    let service = service.clone();
    query_fn(move || {
        let service = service.clone();
        let filter = filter.clone();
        async move { service.list(&filter, page).await }
    })
}

fn save_mutation(
    client: &QueryClient<UserPage>,
    service: &AdminUserService,
    notifier: &Arc<dyn Notifier>,
) -> Mutation<UserInput, UserRecord, AdminUserError> {
    let write_service = service.clone();
    let client = client.clone();
    let on_ok = Arc::clone(notifier);
    let on_err = Arc::clone(notifier);

    Mutation::new("user.save", move |input: UserInput| {
        let service = write_service.clone();
        async move { service.submit(input).await }
    })
    .on_success(move |_, input| {
        client.invalidate_queries(resource_family(USERS_RESOURCE));
        let message = match input {
            UserInput::Create(_) => "User created",
            UserInput::Update(_) => "User updated",
        };
        on_ok.notify(message, NotificationKind::Success);
    })
    .on_error(move |err: &AdminUserError, _| {
        on_err.notify(&err.public_message(), NotificationKind::Error);
    })
}

fn remove_mutation(
    client: &QueryClient<UserPage>,
    service: &AdminUserService,
    notifier: &Arc<dyn Notifier>,
) -> Mutation<UserRecord, (), AdminUserError> {
    let write_service = service.clone();
    let client = client.clone();
    let on_ok = Arc::clone(notifier);
    let on_err = Arc::clone(notifier);

    Mutation::new("user.delete", move |user: UserRecord| {
        let service = write_service.clone();
        async move { service.delete(user.id).await }
    })
    .on_success(move |_, user: &UserRecord| {
        client.invalidate_queries(resource_family(USERS_RESOURCE));
        on_ok.notify(&format!("{} was removed", user.name), NotificationKind::Success);
    })
    .on_error(move |err: &AdminUserError, _| {
        on_err.notify(&err.public_message(), NotificationKind::Error);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_resource_page_size_search_status() {
        let key = users_list_key(3, 5, "ana", StatusFilter::Only(UserStatus::Pending));

        assert!(key.is_resource(USERS_RESOURCE));
        assert_eq!(key.to_string(), r#"["users", 3, 5, "ana", "PENDING"]"#);
    }

    #[test]
    fn table_navigation_flags() {
        let table = UserTable {
            rows: Vec::new(),
            page: 2,
            page_size: 5,
            total: 7,
            total_pages: 2,
            refreshing: false,
        };
        assert!(table.has_previous());
        assert!(!table.has_next());
    }

    #[test]
    fn form_defaults_match_new_user_defaults() {
        let form = UserForm::default();
        assert_eq!(form.role, UserRole::User);
        assert_eq!(form.status, UserStatus::Active);
    }
}
