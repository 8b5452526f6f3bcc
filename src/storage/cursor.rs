//! # Cursor
//!
//! Ordered traversal over a table's leaves, following the `next_leaf`
//! sibling chain across page boundaries rather than stopping once the
//! current leaf is exhausted.
use super::btree::NodeType;
use super::table::{self, Table};
use crate::errors::Error;

pub struct Cursor<'a> {
    pub table: &'a mut Table,
    pub page_num: u32,
    pub cell_num: u32,
    pub end_of_table: bool,
}

impl<'a> Cursor<'a> {
    /// Positions at the first cell of the leftmost leaf.
    pub fn start(table: &'a mut Table) -> Result<Self, Error> {
        let row_size = table.schema.row_size();
        let mut page_num = table.root_page_num;
        loop {
            let node = table::read_node(&mut table.pager, row_size, page_num)?;
            if node.get_node_type()? == NodeType::NodeLeaf {
                let end_of_table = node.leaf_node_num_cells() == 0;
                return Ok(Cursor { table, page_num, cell_num: 0, end_of_table });
            }
            page_num = node.internal_node_child(0)?;
        }
    }

    /// Positions one past the last cell of the rightmost leaf.
    pub fn end(table: &'a mut Table) -> Result<Self, Error> {
        let row_size = table.schema.row_size();
        let mut page_num = table.root_page_num;
        loop {
            let node = table::read_node(&mut table.pager, row_size, page_num)?;
            if node.get_node_type()? == NodeType::NodeLeaf {
                let cell_num = node.leaf_node_num_cells();
                return Ok(Cursor { table, page_num, cell_num, end_of_table: true });
            }
            page_num = node.internal_node_right_child();
        }
    }

    /// Descends to the leaf and cell index where `key` would live.
    pub fn find(table: &'a mut Table, key: u32) -> Result<Self, Error> {
        let root_page_num = table.root_page_num;
        let (page_num, cell_num) = table::find_node(table, root_page_num, key)?;
        Ok(Cursor { table, page_num, cell_num, end_of_table: false })
    }

    pub fn read_value(&mut self) -> Result<Vec<u8>, Error> {
        let row_size = self.table.schema.row_size();
        let node = table::read_node(&mut self.table.pager, row_size, self.page_num)?;
        Ok(node.leaf_node_value(self.cell_num as usize)?.to_vec())
    }

    /// Moves to the next cell, following `next_leaf` once the current leaf
    /// is exhausted. `end_of_table` is set once the last leaf in the chain
    /// (the one whose `next_leaf` is 0) runs out of cells.
    pub fn advance(&mut self) -> Result<(), Error> {
        let row_size = self.table.schema.row_size();
        let node = table::read_node(&mut self.table.pager, row_size, self.page_num)?;
        self.cell_num += 1;

        if self.cell_num >= node.leaf_node_num_cells() {
            let next_leaf = node.leaf_node_next_leaf();
            if next_leaf == 0 {
                self.end_of_table = true;
            } else {
                self.page_num = next_leaf;
                self.cell_num = 0;
            }
        }
        Ok(())
    }
}
