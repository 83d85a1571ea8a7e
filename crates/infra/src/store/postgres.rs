//! Postgres-backed store.
//!
//! Each mutating operation runs in one sqlx transaction. The work-order row is
//! locked first, then the order's reservation rows, then the touched
//! inventory rows in part-key order, so two kits against the same component
//! serialize on the row lock instead of both reading stale availability.
//! CHECK constraints on `inventory` back the `0 <= reserved <= on_hand`
//! invariant.
//!
//! ## Error Mapping
//!
//! | SQLx error | Code | StoreError |
//! |---|---|---|
//! | Database (unique violation) | `23505` | `Domain(Conflict)` |
//! | Database (foreign key violation) | `23503` | `Domain(Conflict)` |
//! | Database (check violation) | `23514` | `Domain(InvariantViolation)` |
//! | anything else | | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use forgemrp_core::{DomainError, PartKey, Quantity, SerialNumber, WorkOrderId};
use forgemrp_inventory::{
    LedgerChanges, LedgerView, Reservation, StockItem, StockMovement, StockTransaction,
};
use forgemrp_production::{
    BomIndex, BomLine, KitReport, NewWorkOrder, Requirement, SerialStatus, TraceRecord, UnitSerial,
    WorkOrder, WorkOrderPatch, explode, generate_serial, kit, resolve_requirements,
    settle_cancellation,
};

use super::{
    Committed, DeletedWorkOrder, MAX_SERIAL_ATTEMPTS, MrpStore, SerialRequest, SerialTransition,
    StoreError, StoreResult, UpdatedWorkOrder,
};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const WORK_ORDER_COLUMNS: &str = "id, assembly, quantity, qty_good, qty_scrap, status, priority, \
     due_date, notes, created_at, started_at, completed_at, updated_at";

const STOCK_COLUMNS: &str =
    "part_key, on_hand, reserved, reorder_point, reorder_qty, updated_at";

const SERIAL_COLUMNS: &str = "serial, work_order_id, status, notes, created_at, updated_at";

/// Postgres-backed store. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresMrpStore {
    pool: Arc<PgPool>,
}

impl PostgresMrpStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn commit(tx: Transaction<'_, Postgres>) -> StoreResult<()> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

/// Load a work order, locking its row for the rest of the transaction.
async fn lock_work_order(
    tx: &mut Transaction<'_, Postgres>,
    id: WorkOrderId,
) -> StoreResult<WorkOrder> {
    let sql = format!("SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_work_order", e))?
        .ok_or_else(|| DomainError::not_found(format!("work order {id}")))?;
    decode::<WorkOrderRow, _>(&row)
}

async fn fetch_work_order(pool: &PgPool, id: WorkOrderId) -> StoreResult<WorkOrder> {
    let sql = format!("SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_work_order", e))?
        .ok_or_else(|| DomainError::not_found(format!("work order {id}")))?;
    decode::<WorkOrderRow, _>(&row)
}

async fn save_work_order(tx: &mut Transaction<'_, Postgres>, order: &WorkOrder) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE work_orders SET
            qty_good = $2,
            qty_scrap = $3,
            status = $4,
            priority = $5,
            due_date = $6,
            notes = $7,
            started_at = $8,
            completed_at = $9,
            updated_at = $10
        WHERE id = $1
        "#,
    )
    .bind(order.id_typed().as_uuid())
    .bind(order.qty_good().value())
    .bind(order.qty_scrap().value())
    .bind(order.status().as_str())
    .bind(order.priority().as_str())
    .bind(order.due_date())
    .bind(order.notes())
    .bind(order.started_at())
    .bind(order.completed_at())
    .bind(order.updated_at())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("save_work_order", e))?;
    Ok(())
}

/// Build a ledger view for one order: lock its reservation rows, make sure
/// every touched part has an inventory row, then lock those rows in part-key
/// order.
async fn lock_ledger(
    tx: &mut Transaction<'_, Postgres>,
    work_order_id: WorkOrderId,
    mut parts: Vec<PartKey>,
    now: DateTime<Utc>,
) -> StoreResult<LedgerView> {
    let mut view = LedgerView::new(now);

    let rows = sqlx::query(
        r#"
        SELECT work_order_id, part_key, quantity, updated_at
        FROM reservations
        WHERE work_order_id = $1
        ORDER BY part_key
        FOR UPDATE
        "#,
    )
    .bind(work_order_id.as_uuid())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_reservations", e))?;
    for row in &rows {
        let reservation = decode::<ReservationRow, Reservation>(row)?;
        parts.push(reservation.part.clone());
        view.load_reservation(reservation);
    }

    for item in lock_stock(tx, parts).await? {
        view.load_stock(item);
    }
    Ok(view)
}

async fn lock_stock(
    tx: &mut Transaction<'_, Postgres>,
    mut parts: Vec<PartKey>,
) -> StoreResult<Vec<StockItem>> {
    parts.sort();
    parts.dedup();
    if parts.is_empty() {
        return Ok(Vec::new());
    }
    let keys: Vec<String> = parts.into_iter().map(String::from).collect();

    sqlx::query(
        r#"
        INSERT INTO inventory (part_key)
        SELECT k FROM unnest($1::text[]) AS k ORDER BY k
        ON CONFLICT (part_key) DO NOTHING
        "#,
    )
    .bind(&keys)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("ensure_inventory_rows", e))?;

    let sql = format!(
        "SELECT {STOCK_COLUMNS} FROM inventory WHERE part_key = ANY($1) ORDER BY part_key FOR UPDATE"
    );
    let rows = sqlx::query(&sql)
        .bind(&keys)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stock", e))?;
    rows.iter().map(decode::<StockRow, _>).collect()
}

/// Write back everything a ledger view changed.
async fn persist(tx: &mut Transaction<'_, Postgres>, changes: &LedgerChanges) -> StoreResult<()> {
    for item in &changes.stock {
        sqlx::query(
            r#"
            INSERT INTO inventory (part_key, on_hand, reserved, reorder_point, reorder_qty, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (part_key) DO UPDATE SET
                on_hand = EXCLUDED.on_hand,
                reserved = EXCLUDED.reserved,
                reorder_point = EXCLUDED.reorder_point,
                reorder_qty = EXCLUDED.reorder_qty,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(item.part().as_str())
        .bind(item.on_hand().value())
        .bind(item.reserved().value())
        .bind(item.reorder_point().map(Decimal::from))
        .bind(item.reorder_qty().map(Decimal::from))
        .bind(item.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_inventory", e))?;
    }

    for reservation in &changes.reservations {
        if reservation.is_released() {
            sqlx::query("DELETE FROM reservations WHERE work_order_id = $1 AND part_key = $2")
                .bind(reservation.work_order_id.as_uuid())
                .bind(reservation.part.as_str())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("delete_reservation", e))?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO reservations (work_order_id, part_key, quantity, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (work_order_id, part_key) DO UPDATE SET
                    quantity = EXCLUDED.quantity,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(reservation.work_order_id.as_uuid())
            .bind(reservation.part.as_str())
            .bind(reservation.quantity.value())
            .bind(reservation.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_reservation", e))?;
        }
    }

    for t in &changes.transactions {
        sqlx::query(
            r#"
            INSERT INTO inventory_transactions (id, part_key, kind, delta, reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(t.id)
        .bind(t.part.as_str())
        .bind(t.kind.as_str())
        .bind(t.delta)
        .bind(&t.reference)
        .bind(t.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;
    }
    Ok(())
}

/// Persist a finished view and commit.
async fn finish<T>(
    mut tx: Transaction<'_, Postgres>,
    value: T,
    view: LedgerView,
) -> StoreResult<Committed<T>> {
    let reorder = view.reorder_candidates();
    let changes = view.into_changes();
    persist(&mut tx, &changes).await?;
    commit(tx).await?;
    Ok(Committed::from_changes(value, &changes, reorder))
}

async fn direct_bom_lines(
    tx: &mut Transaction<'_, Postgres>,
    parent: &PartKey,
) -> StoreResult<Vec<BomLine>> {
    let rows = sqlx::query(
        "SELECT parent, child, qty_per FROM bom_lines WHERE parent = $1 ORDER BY child",
    )
    .bind(parent.as_str())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("bom_lines", e))?;
    rows.iter().map(decode::<BomRow, _>).collect()
}

async fn serial_exists(
    tx: &mut Transaction<'_, Postgres>,
    serial: &SerialNumber,
) -> StoreResult<bool> {
    let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM unit_serials WHERE serial = $1) AS taken")
        .bind(serial.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("serial_exists", e))?;
    row.try_get::<bool, _>("taken")
        .map_err(|e| map_sqlx_error("serial_exists", e))
}

async fn fetch_serial(pool: &PgPool, serial: &SerialNumber) -> StoreResult<UnitSerial> {
    let sql = format!("SELECT {SERIAL_COLUMNS} FROM unit_serials WHERE serial = $1");
    let row = sqlx::query(&sql)
        .bind(serial.as_str())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_serial", e))?
        .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))?;
    decode::<SerialRow, _>(&row)
}

#[async_trait]
impl MrpStore for PostgresMrpStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self, new), fields(assembly = %new.assembly), err)]
    async fn create_work_order(&self, new: NewWorkOrder) -> StoreResult<WorkOrder> {
        let order = WorkOrder::create(WorkOrderId::new(), new, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO work_orders (
                id, assembly, quantity, qty_good, qty_scrap, status, priority,
                due_date, notes, created_at, started_at, completed_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.assembly().as_str())
        .bind(order.quantity().value())
        .bind(order.qty_good().value())
        .bind(order.qty_scrap().value())
        .bind(order.status().as_str())
        .bind(order.priority().as_str())
        .bind(order.due_date())
        .bind(order.notes())
        .bind(order.created_at())
        .bind(order.started_at())
        .bind(order.completed_at())
        .bind(order.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_work_order", e))?;
        Ok(order)
    }

    #[instrument(skip(self), fields(work_order_id = %id), err)]
    async fn work_order(&self, id: WorkOrderId) -> StoreResult<WorkOrder> {
        fetch_work_order(&self.pool, id).await
    }

    #[instrument(skip(self, patch), fields(work_order_id = %id, to = ?patch.status), err)]
    async fn update_work_order(
        &self,
        id: WorkOrderId,
        patch: WorkOrderPatch,
    ) -> StoreResult<Committed<UpdatedWorkOrder>> {
        let mut tx = self.begin().await?;
        let mut order = lock_work_order(&mut tx, id).await?;
        let mut view = lock_ledger(&mut tx, id, vec![order.assembly().clone()], Utc::now()).await?;

        // Dropping `tx` on error rolls everything back.
        let outcome = order.apply_update(&patch, &mut view)?;
        save_work_order(&mut tx, &order).await?;

        finish(tx, UpdatedWorkOrder { order, outcome }, view).await
    }

    #[instrument(skip(self), fields(work_order_id = %id, serials_removed = tracing::field::Empty), err)]
    async fn delete_work_order(&self, id: WorkOrderId) -> StoreResult<Committed<DeletedWorkOrder>> {
        let mut tx = self.begin().await?;
        lock_work_order(&mut tx, id).await?;
        let mut view = lock_ledger(&mut tx, id, Vec::new(), Utc::now()).await?;
        let released = settle_cancellation(id, &mut view)?;

        let reorder = view.reorder_candidates();
        let changes = view.into_changes();
        persist(&mut tx, &changes).await?;

        let serials_removed = sqlx::query("DELETE FROM unit_serials WHERE work_order_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_serials", e))?
            .rows_affected() as usize;
        sqlx::query("DELETE FROM work_orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_work_order", e))?;
        commit(tx).await?;

        Span::current().record("serials_removed", serials_removed);
        Ok(Committed::from_changes(
            DeletedWorkOrder {
                work_order_id: id,
                serials_removed,
                released,
            },
            &changes,
            reorder,
        ))
    }

    #[instrument(skip(self), fields(work_order_id = %id, lines = tracing::field::Empty), err)]
    async fn kit_work_order(&self, id: WorkOrderId) -> StoreResult<Committed<KitReport>> {
        let mut tx = self.begin().await?;
        let order = lock_work_order(&mut tx, id).await?;
        let lines = direct_bom_lines(&mut tx, order.assembly()).await?;
        let requirements = resolve_requirements(order.assembly(), &lines, order.quantity())?;

        let parts = requirements.iter().map(|r| r.component.clone()).collect();
        let mut view = lock_ledger(&mut tx, id, parts, Utc::now()).await?;
        let report = kit(&order, &requirements, &mut view)?;

        Span::current().record("lines", report.lines.len());
        finish(tx, report, view).await
    }

    #[instrument(skip(self), fields(work_order_id = %id), err)]
    async fn reservations(&self, id: WorkOrderId) -> StoreResult<Vec<Reservation>> {
        fetch_work_order(&self.pool, id).await?;
        let rows = sqlx::query(
            r#"
            SELECT work_order_id, part_key, quantity, updated_at
            FROM reservations
            WHERE work_order_id = $1
            ORDER BY part_key
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reservations", e))?;
        rows.iter().map(decode::<ReservationRow, _>).collect()
    }

    #[instrument(skip(self, request), fields(work_order_id = %id, serial = tracing::field::Empty), err)]
    async fn assign_serial(&self, id: WorkOrderId, request: SerialRequest) -> StoreResult<UnitSerial> {
        let mut tx = self.begin().await?;
        let order = lock_work_order(&mut tx, id).await?;
        let now = Utc::now();

        let serial = match request.serial {
            Some(serial) => serial,
            None => {
                let mut found = None;
                for attempt in 1..=MAX_SERIAL_ATTEMPTS {
                    let candidate = generate_serial(order.assembly(), now, attempt)?;
                    if !serial_exists(&mut tx, &candidate).await? {
                        found = Some(candidate);
                        break;
                    }
                }
                found.ok_or_else(|| DomainError::conflict("could not generate a unique serial number"))?
            }
        };
        Span::current().record("serial", serial.as_str());

        let unit = UnitSerial::assign(&order, serial, request.status, request.notes, now)?;
        let sql = format!("INSERT INTO unit_serials ({SERIAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)");
        sqlx::query(&sql)
            .bind(unit.serial().as_str())
            .bind(unit.work_order_id().as_uuid())
            .bind(unit.status().as_str())
            .bind(unit.notes())
            .bind(unit.created_at())
            .bind(unit.updated_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Domain(DomainError::conflict(format!(
                        "serial {} is already assigned",
                        unit.serial()
                    )))
                } else {
                    map_sqlx_error("insert_serial", e)
                }
            })?;
        commit(tx).await?;
        Ok(unit)
    }

    #[instrument(skip(self), fields(work_order_id = %id), err)]
    async fn serials(&self, id: WorkOrderId) -> StoreResult<Vec<UnitSerial>> {
        fetch_work_order(&self.pool, id).await?;
        let sql = format!(
            "SELECT {SERIAL_COLUMNS} FROM unit_serials WHERE work_order_id = $1 ORDER BY created_at, serial"
        );
        let rows = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("serials", e))?;
        rows.iter().map(decode::<SerialRow, _>).collect()
    }

    #[instrument(skip(self), fields(serial = %serial), err)]
    async fn trace_serial(&self, serial: &SerialNumber) -> StoreResult<TraceRecord> {
        let unit = fetch_serial(&self.pool, serial).await?;
        let order = fetch_work_order(&self.pool, unit.work_order_id()).await?;
        Ok(TraceRecord::new(unit, &order))
    }

    #[instrument(skip(self, notes), fields(serial = %serial, to = %to), err)]
    async fn transition_serial(
        &self,
        serial: &SerialNumber,
        to: SerialStatus,
        notes: Option<String>,
    ) -> StoreResult<SerialTransition> {
        let mut tx = self.begin().await?;
        let sql = format!("SELECT {SERIAL_COLUMNS} FROM unit_serials WHERE serial = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(serial.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_serial", e))?
            .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))?;
        let mut unit = decode::<SerialRow, UnitSerial>(&row)?;
        let previous = unit.status();
        unit.transition(to, notes, Utc::now())?;

        sqlx::query("UPDATE unit_serials SET status = $2, notes = $3, updated_at = $4 WHERE serial = $1")
            .bind(unit.serial().as_str())
            .bind(unit.status().as_str())
            .bind(unit.notes())
            .bind(unit.updated_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_serial", e))?;
        commit(tx).await?;
        Ok(SerialTransition { previous, unit })
    }

    #[instrument(skip(self), fields(part = %part), err)]
    async fn stock(&self, part: &PartKey) -> StoreResult<StockItem> {
        let sql = format!("SELECT {STOCK_COLUMNS} FROM inventory WHERE part_key = $1");
        let row = sqlx::query(&sql)
            .bind(part.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stock", e))?;
        match row {
            Some(row) => decode::<StockRow, _>(&row),
            None => Ok(StockItem::new(part.clone(), Utc::now())),
        }
    }

    #[instrument(skip(self, movement), fields(part = %part, kind = %movement.kind(), delta = %movement.delta()), err)]
    async fn record_movement(
        &self,
        part: &PartKey,
        movement: StockMovement,
        reference: String,
    ) -> StoreResult<Committed<StockItem>> {
        let mut tx = self.begin().await?;
        let mut view = LedgerView::new(Utc::now());
        for item in lock_stock(&mut tx, vec![part.clone()]).await? {
            view.load_stock(item);
        }
        view.apply_movement(part, movement, &reference)?;
        let item = view
            .stock(part)
            .cloned()
            .ok_or_else(|| DomainError::invariant(format!("stock row for {part} vanished")))?;
        finish(tx, item, view).await
    }

    #[instrument(skip(self), fields(part = %part), err)]
    async fn transactions(&self, part: &PartKey) -> StoreResult<Vec<StockTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, part_key, kind, delta, reference, created_at
            FROM inventory_transactions
            WHERE part_key = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(part.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions", e))?;
        rows.iter().map(decode::<TransactionRow, _>).collect()
    }

    #[instrument(skip(self), fields(part = %part), err)]
    async fn set_reorder(
        &self,
        part: &PartKey,
        point: Option<Quantity>,
        qty: Option<Quantity>,
    ) -> StoreResult<Committed<StockItem>> {
        let mut tx = self.begin().await?;
        let mut view = LedgerView::new(Utc::now());
        for item in lock_stock(&mut tx, vec![part.clone()]).await? {
            view.load_stock(item);
        }
        view.set_reorder(part, point, qty);
        let item = view
            .stock(part)
            .cloned()
            .ok_or_else(|| DomainError::invariant(format!("stock row for {part} vanished")))?;
        finish(tx, item, view).await
    }

    #[instrument(skip(self, line), fields(parent = %line.parent(), child = %line.child()), err)]
    async fn upsert_bom_line(&self, line: BomLine) -> StoreResult<BomLine> {
        sqlx::query(
            r#"
            INSERT INTO bom_lines (parent, child, qty_per)
            VALUES ($1, $2, $3)
            ON CONFLICT (parent, child) DO UPDATE SET qty_per = EXCLUDED.qty_per
            "#,
        )
        .bind(line.parent().as_str())
        .bind(line.child().as_str())
        .bind(line.qty_per().value())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_bom_line", e))?;
        Ok(line)
    }

    #[instrument(skip(self), fields(parent = %parent), err)]
    async fn bom_lines(&self, parent: &PartKey) -> StoreResult<Vec<BomLine>> {
        let rows = sqlx::query(
            "SELECT parent, child, qty_per FROM bom_lines WHERE parent = $1 ORDER BY child",
        )
        .bind(parent.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("bom_lines", e))?;
        rows.iter().map(decode::<BomRow, _>).collect()
    }

    #[instrument(skip(self), fields(parent = %parent, qty = %qty), err)]
    async fn explode_bom(&self, parent: &PartKey, qty: Quantity) -> StoreResult<Vec<Requirement>> {
        // UNION (not UNION ALL) stops the walk when a cycle revisits a line;
        // `explode` then reports the cycle.
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE reachable (parent, child, qty_per) AS (
                SELECT parent, child, qty_per FROM bom_lines WHERE parent = $1
                UNION
                SELECT b.parent, b.child, b.qty_per
                FROM bom_lines b
                JOIN reachable r ON b.parent = r.child
            )
            SELECT parent, child, qty_per FROM reachable
            "#,
        )
        .bind(parent.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("explode_bom", e))?;
        let lines = rows
            .iter()
            .map(decode::<BomRow, _>)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(explode(parent, qty, &BomIndex::from_lines(lines))?)
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") => StoreError::Domain(DomainError::conflict(msg)),
                Some("23514") => StoreError::Domain(DomainError::invariant(msg)),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

/// Decode a row into its raw row type, then into the domain type.
fn decode<R, T>(row: &PgRow) -> StoreResult<T>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = DomainError>,
{
    let raw = R::from_row(row).map_err(|e| map_sqlx_error("decode_row", e))?;
    T::try_from(raw).map_err(|e| StoreError::Backend(format!("corrupt row: {e}")))
}

fn quantity(value: Decimal) -> Result<Quantity, DomainError> {
    Quantity::new(value)
}

// SQLx row types

#[derive(Debug)]
struct WorkOrderRow {
    id: Uuid,
    assembly: String,
    quantity: Decimal,
    qty_good: Decimal,
    qty_scrap: Decimal,
    status: String,
    priority: String,
    due_date: Option<NaiveDate>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for WorkOrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(WorkOrderRow {
            id: row.try_get("id")?,
            assembly: row.try_get("assembly")?,
            quantity: row.try_get("quantity")?,
            qty_good: row.try_get("qty_good")?,
            qty_scrap: row.try_get("qty_scrap")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            due_date: row.try_get("due_date")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<WorkOrderRow> for WorkOrder {
    type Error = DomainError;

    fn try_from(row: WorkOrderRow) -> Result<Self, Self::Error> {
        Ok(WorkOrder::restore(
            WorkOrderId::from_uuid(row.id),
            PartKey::parse(&row.assembly)?,
            quantity(row.quantity)?,
            quantity(row.qty_good)?,
            quantity(row.qty_scrap)?,
            row.status.parse()?,
            row.priority.parse()?,
            row.due_date,
            row.notes,
            row.created_at,
            row.started_at,
            row.completed_at,
            row.updated_at,
        ))
    }
}

#[derive(Debug)]
struct StockRow {
    part_key: String,
    on_hand: Decimal,
    reserved: Decimal,
    reorder_point: Option<Decimal>,
    reorder_qty: Option<Decimal>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            part_key: row.try_get("part_key")?,
            on_hand: row.try_get("on_hand")?,
            reserved: row.try_get("reserved")?,
            reorder_point: row.try_get("reorder_point")?,
            reorder_qty: row.try_get("reorder_qty")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<StockRow> for StockItem {
    type Error = DomainError;

    fn try_from(row: StockRow) -> Result<Self, Self::Error> {
        StockItem::restore(
            PartKey::parse(&row.part_key)?,
            quantity(row.on_hand)?,
            quantity(row.reserved)?,
            row.reorder_point.map(quantity).transpose()?,
            row.reorder_qty.map(quantity).transpose()?,
            row.updated_at,
        )
    }
}

#[derive(Debug)]
struct ReservationRow {
    work_order_id: Uuid,
    part_key: String,
    quantity: Decimal,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ReservationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReservationRow {
            work_order_id: row.try_get("work_order_id")?,
            part_key: row.try_get("part_key")?,
            quantity: row.try_get("quantity")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = DomainError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            work_order_id: WorkOrderId::from_uuid(row.work_order_id),
            part: PartKey::parse(&row.part_key)?,
            quantity: quantity(row.quantity)?,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct TransactionRow {
    id: Uuid,
    part_key: String,
    kind: String,
    delta: Decimal,
    reference: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TransactionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            id: row.try_get("id")?,
            part_key: row.try_get("part_key")?,
            kind: row.try_get("kind")?,
            delta: row.try_get("delta")?,
            reference: row.try_get("reference")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<TransactionRow> for StockTransaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(StockTransaction {
            id: row.id,
            part: PartKey::parse(&row.part_key)?,
            kind: row.kind.parse()?,
            delta: row.delta,
            reference: row.reference,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct BomRow {
    parent: String,
    child: String,
    qty_per: Decimal,
}

impl<'r> FromRow<'r, PgRow> for BomRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BomRow {
            parent: row.try_get("parent")?,
            child: row.try_get("child")?,
            qty_per: row.try_get("qty_per")?,
        })
    }
}

impl TryFrom<BomRow> for BomLine {
    type Error = DomainError;

    fn try_from(row: BomRow) -> Result<Self, Self::Error> {
        BomLine::new(
            PartKey::parse(&row.parent)?,
            PartKey::parse(&row.child)?,
            quantity(row.qty_per)?,
        )
    }
}

#[derive(Debug)]
struct SerialRow {
    serial: String,
    work_order_id: Uuid,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SerialRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SerialRow {
            serial: row.try_get("serial")?,
            work_order_id: row.try_get("work_order_id")?,
            status: row.try_get("status")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<SerialRow> for UnitSerial {
    type Error = DomainError;

    fn try_from(row: SerialRow) -> Result<Self, Self::Error> {
        Ok(UnitSerial::restore(
            SerialNumber::parse(&row.serial)?,
            WorkOrderId::from_uuid(row.work_order_id),
            row.status.parse::<SerialStatus>()?,
            row.notes,
            row.created_at,
            row.updated_at,
        ))
    }
}
