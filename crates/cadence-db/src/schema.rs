//! Table and column names, and the queries built from them.

pub const TASKS_TABLE: &str = "tasks";
pub const PUSHES_TABLE: &str = "pushes";

pub mod task {
    pub const ID: &str = "id";
    pub const PROJECT: &str = "project";
    pub const BUILD_VARIANT: &str = "build_variant";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const REQUESTER: &str = "requester";
    pub const REVISION: &str = "revision";
    pub const ORDER_NUMBER: &str = "order_number";
    pub const STATUS: &str = "status";
    pub const FINISHED_AT: &str = "finished_at";

    pub const ALL: [&str; 9] = [
        ID,
        PROJECT,
        BUILD_VARIANT,
        DISPLAY_NAME,
        REQUESTER,
        REVISION,
        ORDER_NUMBER,
        STATUS,
        FINISHED_AT,
    ];
}

pub mod push {
    pub const ID: &str = "id";
    pub const LOCATION: &str = "location";
    pub const TASK_ID: &str = "task_id";
    pub const CREATED_AT: &str = "created_at";
    pub const REVISION: &str = "revision";
    pub const ORDER_NUMBER: &str = "order_number";
    pub const STATUS: &str = "status";

    pub const ALL: [&str; 7] = [ID, LOCATION, TASK_ID, CREATED_AT, REVISION, ORDER_NUMBER, STATUS];
}

// $1 project, $2 build_variant, $3 display_name, $4 requester, $5 before_order
pub const FIND_LATEST_COMPLETED: &str = r#"
    SELECT id, project, build_variant, display_name, requester, revision,
           order_number, status, finished_at
    FROM tasks
    WHERE project = $1
      AND build_variant = $2
      AND display_name = $3
      AND requester = $4
      AND status IN ('success', 'failed')
      AND order_number < $5
    ORDER BY order_number DESC, finished_at DESC NULLS LAST
    LIMIT 1
"#;

// Latest execution per variant, counted when it failed.
// $1 project, $2 revision, $3 requester, $4 display_name, $5 excluded variant
pub const COUNT_FAILING_VARIANTS: &str = r#"
    SELECT COUNT(*)
    FROM (
        SELECT DISTINCT ON (build_variant) status
        FROM tasks
        WHERE project = $1
          AND revision = $2
          AND requester = $3
          AND display_name = $4
          AND build_variant <> $5
        ORDER BY build_variant, finished_at DESC NULLS LAST
    ) latest
    WHERE status = 'failed'
"#;

pub const EXISTING_TASK_IDS: &str = "SELECT id FROM tasks WHERE id = ANY($1)";

pub const INSERT_PUSH: &str = r#"
    INSERT INTO pushes (id, location, task_id, created_at, revision, order_number, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

pub const UPDATE_PUSH_STATUS: &str = "UPDATE pushes SET status = $2 WHERE id = $1";

// $1 location, $2 order_number
pub const FIND_PUSH_LOG_AFTER: &str = r#"
    SELECT id, location, task_id, created_at, revision, order_number, status
    FROM pushes
    WHERE location = $1
      AND status IN ('pushing', 'success')
      AND order_number >= $2
    ORDER BY order_number DESC, created_at DESC
    LIMIT 1
"#;
