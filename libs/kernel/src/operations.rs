use crate::model::{Dn, Entry, SearchRequest};
use crate::perms::Principal;

#[derive(Debug, Clone)]
pub struct AddRequest {
    pub principal: Principal,
    pub entry: Entry,
}

impl AddRequest {
    pub fn new(principal: Principal, entry: Entry) -> Self {
        Self { principal, entry }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub principal: Principal,
    pub dn: Dn,
}

#[derive(Debug, Clone)]
pub enum Operation {
    Add(AddRequest),
    Search(SearchRequest),
    Delete(DeleteRequest),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Add(_) => "add",
            Operation::Search(_) => "search",
            Operation::Delete(_) => "delete",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Effect {
    Added(Entry),
    Entries(Vec<Entry>),
    Deleted(Dn),
}
