//! # Table / Anchor
//!
//! Ties the node layout in [`super::btree`] to the buffer pool in
//! [`super::pager`]: every tree operation reads a node out of the pager by
//! page number, mutates its own owned copy, and writes it back before
//! touching any other page, so two pages are never borrowed at once.
//!
//! Page 0 holds the anchor record — the table's [`Schema`] plus its root
//! page number — written on every schema change and read back on open,
//! keeping a table's schema resident in the first page of its file.
use super::btree::{Node, NodeType, INTERNAL_NODE_MAX_CELLS, INVALID_PAGE_NUM};
use super::cursor::Cursor;
use super::encoding;
use super::pager::{Pager, PAGE_SIZE};
use super::row::Row;
use super::schema::Schema;
use crate::err;
use crate::errors::Error;
use bincode::{config, Decode, Encode};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const ANCHOR_PAGE: u32 = 0;
const ROOT_PAGE: u32 = 1;

#[derive(Encode, Decode, Debug)]
struct Anchor {
    root_page_num: u32,
    schema: Schema,
}

pub struct Table {
    pub path: PathBuf,
    pub schema: Schema,
    pub root_page_num: u32,
    pub pager: Pager,
}

impl Table {
    /// Opens `path`, creating it if absent. A freshly created file gets
    /// `default_schema` as its anchor and an empty leaf as its root; an
    /// existing file's anchor and root page number are read back from it,
    /// and `default_schema` is ignored.
    pub fn open<P: AsRef<Path>>(path: P, default_schema: Schema) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut pager = Pager::open(&path)?;

        if pager.num_pages() > 0 {
            let anchor_bytes = pager.read(ANCHOR_PAGE)?;
            pager.unpin(ANCHOR_PAGE);
            let (anchor, _): (Anchor, usize) =
                bincode::decode_from_slice(&anchor_bytes, config::standard())
                    .map_err(|e| err!(Encoding, "failed to decode anchor: {}", e))?;
            debug!(root_page_num = anchor.root_page_num, "opened existing table");
            Ok(Table {
                path,
                schema: anchor.schema,
                root_page_num: anchor.root_page_num,
                pager,
            })
        } else {
            let mut table = Table {
                path,
                schema: default_schema,
                root_page_num: ROOT_PAGE,
                pager,
            };
            // The anchor (page 0) must be allocated before the root (page 1):
            // the pager only treats a page as "new" (no disk read) when it is
            // allocated in increasing order, so writing page 1 first would
            // make the pager believe page 0 already existed on disk.
            table.flush_anchor()?;
            let mut root = Node::new([0u8; PAGE_SIZE], table.schema.row_size());
            initialize_leaf_node(&mut root);
            root.set_node_root(true);
            write_node(&mut table.pager, table.root_page_num, &root)?;
            debug!("created new table");
            Ok(table)
        }
    }

    fn flush_anchor(&mut self) -> Result<(), Error> {
        let anchor = Anchor {
            root_page_num: self.root_page_num,
            schema: self.schema.clone(),
        };
        let encoded = bincode::encode_to_vec(&anchor, config::standard())
            .map_err(|e| err!(Encoding, "failed to encode anchor: {}", e))?;
        if encoded.len() > PAGE_SIZE {
            return Err(err!(Encoding, "anchor ({} bytes) exceeds page size", encoded.len()));
        }
        let mut buf = [0u8; PAGE_SIZE];
        buf[..encoded.len()].copy_from_slice(&encoded);
        self.pager.write(ANCHOR_PAGE, &buf)?;
        self.pager.unpin(ANCHOR_PAGE);
        Ok(())
    }

    /// Every public statement entry point ends with `unpin_all` as a coarse
    /// belt-and-braces cleanup: each individual page access already unpins
    /// itself, but a statement boundary is where a forgotten unpin (a bug
    /// elsewhere in the tree code) would otherwise silently accumulate
    /// toward `BufferExhausted`.
    pub fn insert(&mut self, row: Row) -> Result<(), Error> {
        let result = insert_row(self, &row);
        self.pager.unpin_all();
        result
    }

    pub fn find(&mut self, key: u32) -> Result<Option<Row>, Error> {
        let result = find_row(self, key);
        self.pager.unpin_all();
        result
    }

    pub fn delete(&mut self, key: u32) -> Result<(), Error> {
        let result = delete_row(self, key);
        self.pager.unpin_all();
        result
    }

    pub fn scan(&mut self) -> Result<Vec<Row>, Error> {
        let result = select_rows(self);
        self.pager.unpin_all();
        result
    }

    /// Persists the anchor and flushes every dirty resident page to disk.
    pub fn close(mut self) -> Result<(), Error> {
        self.flush_anchor()?;
        self.pager.flush_all()?;
        Ok(())
    }
}

pub(crate) fn read_node(pager: &mut Pager, row_size: usize, page_num: u32) -> Result<Node, Error> {
    let bytes = pager.read(page_num)?;
    pager.unpin(page_num);
    Ok(Node::new(bytes, row_size))
}

pub(crate) fn write_node(pager: &mut Pager, page_num: u32, node: &Node) -> Result<(), Error> {
    pager.write(page_num, node.as_bytes())?;
    pager.unpin(page_num);
    Ok(())
}

/// Returns the true maximum key reachable from `page_num`'s subtree,
/// recursing through the right child for internal nodes.
pub(crate) fn get_node_max_key(pager: &mut Pager, row_size: usize, page_num: u32) -> Result<u32, Error> {
    let node = read_node(pager, row_size, page_num)?;
    match node.get_node_type()? {
        NodeType::NodeLeaf => node.get_node_max_key(),
        NodeType::NodeInternal => {
            let right_child = node.internal_node_right_child();
            get_node_max_key(pager, row_size, right_child)
        }
    }
}

/// Descends from `page_num` to the leaf that would contain `key`, returning
/// that leaf's page number and the cell index `key` belongs at (which may be
/// one past the last cell, or an existing cell holding `key` itself).
pub(crate) fn find_node(table: &mut Table, page_num: u32, key: u32) -> Result<(u32, u32), Error> {
    let row_size = table.schema.row_size();
    let node = read_node(&mut table.pager, row_size, page_num)?;
    match node.get_node_type()? {
        NodeType::NodeLeaf => Ok((page_num, leaf_node_find(&node, key))),
        NodeType::NodeInternal => {
            let child_index = node.internal_node_find_child(key)?;
            let child_page_num = node.internal_node_child(child_index)?;
            find_node(table, child_page_num, key)
        }
    }
}

fn leaf_node_find(node: &Node, key: u32) -> u32 {
    let mut min_index = 0u32;
    let mut one_past_max = node.leaf_node_num_cells();
    while one_past_max != min_index {
        let index = (min_index + one_past_max) / 2;
        let key_at_index = node.leaf_node_key(index as usize).unwrap_or(0);
        if key == key_at_index {
            return index;
        }
        if key < key_at_index {
            one_past_max = index;
        } else {
            min_index = index + 1;
        }
    }
    min_index
}

pub fn insert_row(table: &mut Table, row: &Row) -> Result<(), Error> {
    let key = row.get_id(&table.schema)?;
    let row_bin = encoding::encode_row(&table.schema, row)?;
    let row_size = table.schema.row_size();
    trace!(key, "inserting row");

    let (page_num, cell_num) = find_node(table, table.root_page_num, key)?;

    {
        let node = read_node(&mut table.pager, row_size, page_num)?;
        if cell_num < node.leaf_node_num_cells() && node.leaf_node_key(cell_num as usize)? == key {
            return Err(Error::DuplicateKey(key));
        }
    }

    leaf_node_insert(table, page_num, cell_num, key, &row_bin)
}

pub fn find_row(table: &mut Table, key: u32) -> Result<Option<Row>, Error> {
    let row_size = table.schema.row_size();
    let (page_num, cell_num) = find_node(table, table.root_page_num, key)?;
    let node = read_node(&mut table.pager, row_size, page_num)?;
    if cell_num >= node.leaf_node_num_cells() || node.leaf_node_key(cell_num as usize)? != key {
        return Ok(None);
    }
    let value = node.leaf_node_value(cell_num as usize)?.to_vec();
    Ok(Some(encoding::decode_row(&table.schema, &value)?))
}

/// Removes the cell holding `key` from its leaf, shifting the remaining
/// cells down. No rebalancing or merging across leaves is performed — the
/// tree's shape only shrinks in height on a subsequent insert-triggered
/// rebuild, never on delete.
pub fn delete_row(table: &mut Table, key: u32) -> Result<(), Error> {
    let row_size = table.schema.row_size();
    let (page_num, cell_num) = find_node(table, table.root_page_num, key)?;
    let mut node = read_node(&mut table.pager, row_size, page_num)?;
    let num_cells = node.leaf_node_num_cells();

    if cell_num >= num_cells || node.leaf_node_key(cell_num as usize)? != key {
        return Err(Error::KeyNotFound(key));
    }

    for i in cell_num..(num_cells - 1) {
        let next = node.leaf_node_cell(i as usize + 1)?.to_vec();
        node.leaf_node_cell_mut(i as usize)?.copy_from_slice(&next);
    }
    node.set_leaf_node_num_cells(num_cells - 1);
    write_node(&mut table.pager, page_num, &node)
}

pub fn select_rows(table: &mut Table) -> Result<Vec<Row>, Error> {
    let mut rows = Vec::new();
    let mut cursor = Cursor::start(table)?;
    while !cursor.end_of_table {
        let buf = cursor.read_value()?;
        rows.push(encoding::decode_row(&cursor.table.schema, &buf)?);
        cursor.advance()?;
    }
    Ok(rows)
}

fn leaf_node_insert(
    table: &mut Table,
    page_num: u32,
    cell_num: u32,
    key: u32,
    value: &[u8],
) -> Result<(), Error> {
    let row_size = table.schema.row_size();
    let mut node = read_node(&mut table.pager, row_size, page_num)?;
    let num_cells = node.leaf_node_num_cells();

    if num_cells as usize >= node.leaf_node_max_cells() {
        warn!(page_num, num_cells, "leaf full, splitting");
        return leaf_node_split_and_insert(table, page_num, cell_num, key, value);
    }

    if cell_num < num_cells {
        for i in (cell_num + 1..=num_cells).rev() {
            let prev = node.leaf_node_cell(i as usize - 1)?.to_vec();
            node.leaf_node_cell_mut(i as usize)?.copy_from_slice(&prev);
        }
    }

    node.set_leaf_node_num_cells(num_cells + 1);
    node.set_leaf_node_key(cell_num as usize, key)?;
    node.set_leaf_node_value(cell_num as usize, value)?;
    write_node(&mut table.pager, page_num, &node)
}

/// Splits a full leaf in two, distributing the `max_cells + 1` logical
/// records (the existing cells plus the one being inserted) between the old
/// and new leaves before setting either leaf's final cell count, rather than
/// inserting into the old leaf first and shuffling afterward.
fn leaf_node_split_and_insert(
    table: &mut Table,
    old_page_num: u32,
    cell_num: u32,
    key: u32,
    value: &[u8],
) -> Result<(), Error> {
    let row_size = table.schema.row_size();
    let new_page_num = table.pager.get_unused_page_num();

    let mut old_node = read_node(&mut table.pager, row_size, old_page_num)?;
    let old_node_is_root = old_node.is_node_root();
    let old_node_parent = old_node.node_parent();
    let old_next_leaf = old_node.leaf_node_next_leaf();
    let left_split_count = old_node.leaf_node_left_split_count();
    let max_cells = old_node.leaf_node_max_cells();
    let old_snapshot = old_node.clone();

    let mut new_node = Node::new([0u8; PAGE_SIZE], row_size);
    initialize_leaf_node(&mut new_node);
    new_node.set_node_parent(old_node_parent);
    new_node.set_leaf_node_next_leaf(old_next_leaf);
    old_node.set_leaf_node_next_leaf(new_page_num);

    for i in (0..=max_cells).rev() {
        let (dest_node, dest_cell) = if i >= left_split_count {
            (&mut new_node, i - left_split_count)
        } else {
            (&mut old_node, i)
        };

        if i == cell_num as usize {
            dest_node.set_leaf_node_key(dest_cell, key)?;
            dest_node.set_leaf_node_value(dest_cell, value)?;
        } else {
            let source_index = if i > cell_num as usize { i - 1 } else { i };
            let source_cell = old_snapshot.leaf_node_cell(source_index)?.to_vec();
            dest_node.leaf_node_cell_mut(dest_cell)?.copy_from_slice(&source_cell);
        }
    }

    old_node.set_leaf_node_num_cells(left_split_count as u32);
    new_node.set_leaf_node_num_cells((max_cells + 1 - left_split_count) as u32);

    write_node(&mut table.pager, old_page_num, &old_node)?;
    write_node(&mut table.pager, new_page_num, &new_node)?;

    if old_node_is_root {
        return create_new_root(table, new_page_num);
    }

    let old_max = old_snapshot.get_node_max_key()?;
    let new_max = get_node_max_key(&mut table.pager, row_size, old_page_num)?;
    {
        let mut parent = read_node(&mut table.pager, row_size, old_node_parent)?;
        parent.update_internal_node_key(old_max, new_max)?;
        write_node(&mut table.pager, old_node_parent, &parent)?;
    }
    internal_node_insert(table, old_node_parent, new_page_num)
}

/// Adds `child_page_num` to `parent_page_num`'s child set, keyed by the
/// child's subtree maximum. Because the rightmost child is stored separately
/// from the (child, key) cell array, a new child that becomes the new
/// rightmost child displaces the old right child into the cell array instead
/// of shifting anything.
fn internal_node_insert(table: &mut Table, parent_page_num: u32, child_page_num: u32) -> Result<(), Error> {
    let row_size = table.schema.row_size();
    let child_max_key = get_node_max_key(&mut table.pager, row_size, child_page_num)?;

    let mut parent = read_node(&mut table.pager, row_size, parent_page_num)?;
    let original_num_keys = parent.internal_node_num_keys();

    if original_num_keys >= INTERNAL_NODE_MAX_CELLS {
        return internal_node_split_and_insert(table, parent_page_num, child_page_num);
    }

    let right_child_page_num = parent.internal_node_right_child();

    if right_child_page_num == INVALID_PAGE_NUM {
        parent.set_internal_node_right_child(child_page_num);
        write_node(&mut table.pager, parent_page_num, &parent)?;
        return reparent(table, child_page_num, parent_page_num);
    }

    let index = parent.internal_node_find_child(child_max_key)?;
    let right_child_max = get_node_max_key(&mut table.pager, row_size, right_child_page_num)?;
    parent.set_internal_node_num_keys(original_num_keys + 1);

    if child_max_key > right_child_max {
        parent.set_internal_node_child(original_num_keys, right_child_page_num)?;
        parent.set_internal_node_key(original_num_keys, right_child_max)?;
        parent.set_internal_node_right_child(child_page_num);
    } else {
        for i in (index + 1..=original_num_keys).rev() {
            let moved_child = parent.internal_node_child(i - 1)?;
            let moved_key = parent.internal_node_key(i - 1)?;
            parent.set_internal_node_child(i, moved_child)?;
            parent.set_internal_node_key(i, moved_key)?;
        }
        parent.set_internal_node_child(index, child_page_num)?;
        parent.set_internal_node_key(index, child_max_key)?;
    }

    write_node(&mut table.pager, parent_page_num, &parent)?;
    reparent(table, child_page_num, parent_page_num)
}

fn reparent(table: &mut Table, child_page_num: u32, new_parent: u32) -> Result<(), Error> {
    let row_size = table.schema.row_size();
    let mut child = read_node(&mut table.pager, row_size, child_page_num)?;
    child.set_node_parent(new_parent);
    write_node(&mut table.pager, child_page_num, &child)
}

fn internal_node_append(node: &mut Node, child: u32, key: u32) -> Result<(), Error> {
    let n = node.internal_node_num_keys();
    node.set_internal_node_num_keys(n + 1);
    node.set_internal_node_child(n, child)?;
    node.set_internal_node_key(n, key)?;
    Ok(())
}

/// Splits a full internal node: the upper half of its (child, key) cells
/// plus its old right child move to a new sibling, and its own former child
/// at the midpoint becomes its new right child. Every moved child is
/// reparented to the new sibling before the incoming child is inserted into
/// whichever of the two nodes its key range now belongs to.
fn internal_node_split_and_insert(table: &mut Table, old_page_num: u32, child_page_num: u32) -> Result<(), Error> {
    let row_size = table.schema.row_size();
    let new_page_num = table.pager.get_unused_page_num();

    let mut old_node = read_node(&mut table.pager, row_size, old_page_num)?;
    let old_node_is_root = old_node.is_node_root();
    let old_node_parent = old_node.node_parent();
    let num_keys = old_node.internal_node_num_keys();
    let split_idx = num_keys / 2;

    let mut new_node = Node::new([0u8; PAGE_SIZE], row_size);
    initialize_internal_node(&mut new_node);
    new_node.set_node_parent(old_node_parent);

    let mut moved_children = Vec::new();
    for i in (split_idx + 1)..num_keys {
        let moved_child = old_node.internal_node_child(i)?;
        let moved_key = old_node.internal_node_key(i)?;
        internal_node_append(&mut new_node, moved_child, moved_key)?;
        moved_children.push(moved_child);
    }
    let old_right_child = old_node.internal_node_right_child();
    new_node.set_internal_node_right_child(old_right_child);
    moved_children.push(old_right_child);

    let new_old_right_child = old_node.internal_node_child(split_idx)?;
    old_node.set_internal_node_right_child(new_old_right_child);
    old_node.set_internal_node_num_keys(split_idx);

    write_node(&mut table.pager, old_page_num, &old_node)?;
    write_node(&mut table.pager, new_page_num, &new_node)?;

    for cp in moved_children {
        reparent(table, cp, new_page_num)?;
    }

    let old_max_after_split = get_node_max_key(&mut table.pager, row_size, old_page_num)?;
    let child_max_key = get_node_max_key(&mut table.pager, row_size, child_page_num)?;
    let destination_page_num = if child_max_key < old_max_after_split {
        old_page_num
    } else {
        new_page_num
    };
    internal_node_insert(table, destination_page_num, child_page_num)?;

    if old_node_is_root {
        create_new_root(table, new_page_num)
    } else {
        internal_node_insert(table, old_node_parent, new_page_num)
    }
}

/// Grows the tree's height by one. The old root's bytes are copied verbatim
/// into a freshly allocated left child (reparenting that left child's own
/// children, if any); the root page itself is then re-initialized in place
/// as a new internal node pointing at the left and right children, so the
/// root's page number never changes across a height increase.
fn create_new_root(table: &mut Table, right_child_page_num: u32) -> Result<(), Error> {
    let row_size = table.schema.row_size();
    let root_page_num = table.root_page_num;

    let root = read_node(&mut table.pager, row_size, root_page_num)?;
    let left_child_page_num = table.pager.get_unused_page_num();

    let mut left_child = root.clone();
    left_child.set_node_root(false);

    if left_child.get_node_type()? == NodeType::NodeInternal {
        let num_keys = left_child.internal_node_num_keys();
        for i in 0..=num_keys {
            let cp = left_child.internal_node_child(i)?;
            reparent(table, cp, left_child_page_num)?;
        }
    }
    write_node(&mut table.pager, left_child_page_num, &left_child)?;

    let mut new_root = Node::new([0u8; PAGE_SIZE], row_size);
    initialize_internal_node(&mut new_root);
    new_root.set_node_root(true);
    new_root.set_internal_node_num_keys(1);
    new_root.set_internal_node_child(0, left_child_page_num)?;
    let left_child_max_key = get_node_max_key(&mut table.pager, row_size, left_child_page_num)?;
    new_root.set_internal_node_key(0, left_child_max_key)?;
    new_root.set_internal_node_right_child(right_child_page_num);
    write_node(&mut table.pager, root_page_num, &new_root)?;

    reparent(table, right_child_page_num, root_page_num)?;
    reparent(table, left_child_page_num, root_page_num)
}

pub(crate) fn initialize_leaf_node(node: &mut Node) {
    node.set_node_type(NodeType::NodeLeaf);
    node.set_node_root(false);
    node.set_leaf_node_num_cells(0);
    node.set_leaf_node_next_leaf(0);
}

pub(crate) fn initialize_internal_node(node: &mut Node) {
    node.set_node_type(NodeType::NodeInternal);
    node.set_node_root(false);
    node.set_internal_node_num_keys(0);
    node.set_internal_node_right_child(INVALID_PAGE_NUM);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::row::Value;
    use crate::storage::schema::FieldType;

    fn schema() -> Schema {
        Schema::new(vec![("id", FieldType::Int, 8), ("name", FieldType::Text, 32)], 0).unwrap()
    }

    #[test]
    fn insert_and_find_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::open(dir.path().join("t.db"), schema()).unwrap();

        table
            .insert(Row::new(vec![Value::Int(1), Value::Text("alice".into())]))
            .unwrap();
        table
            .insert(Row::new(vec![Value::Int(2), Value::Text("bob".into())]))
            .unwrap();

        let row = table.find(1).unwrap().unwrap();
        assert_eq!(row.values[1], Value::Text("alice".into()));
        assert!(table.find(999).unwrap().is_none());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::open(dir.path().join("t.db"), schema()).unwrap();
        table.insert(Row::new(vec![Value::Int(1), Value::Text("a".into())])).unwrap();
        let err = table
            .insert(Row::new(vec![Value::Int(1), Value::Text("b".into())]))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(1)));
    }

    #[test]
    fn delete_removes_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::open(dir.path().join("t.db"), schema()).unwrap();
        table.insert(Row::new(vec![Value::Int(1), Value::Text("a".into())])).unwrap();
        table.delete(1).unwrap();
        assert!(table.find(1).unwrap().is_none());
        assert!(matches!(table.delete(1).unwrap_err(), Error::KeyNotFound(1)));
    }

    #[test]
    fn many_inserts_force_leaf_and_internal_splits() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::open(dir.path().join("t.db"), schema()).unwrap();

        for i in 0..2000u32 {
            table
                .insert(Row::new(vec![Value::Int(i as i64), Value::Text(format!("row-{i}"))]))
                .unwrap();
        }

        for i in 0..2000u32 {
            let row = table.find(i).unwrap().unwrap_or_else(|| panic!("missing key {i}"));
            assert_eq!(row.values[1], Value::Text(format!("row-{i}")));
        }

        let scanned = table.scan().unwrap();
        assert_eq!(scanned.len(), 2000);
        for w in scanned.windows(2) {
            let Value::Int(a) = w[0].values[0] else { unreachable!() };
            let Value::Int(b) = w[1].values[0] else { unreachable!() };
            assert!(a < b, "scan must be key-ordered via next_leaf links");
        }
    }

    #[test]
    fn anchor_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        {
            let mut table = Table::open(&path, schema()).unwrap();
            table.insert(Row::new(vec![Value::Int(1), Value::Text("a".into())])).unwrap();
            table.close().unwrap();
        }
        let mut reopened = Table::open(&path, schema()).unwrap();
        let row = reopened.find(1).unwrap().unwrap();
        assert_eq!(row.values[1], Value::Text("a".into()));
    }
}
