//! In-memory person list for the CRUD demo.
//!
//! Every call issues a simulated request through the controller and only
//! touches the list once that request completes, so a paused request holds
//! its change back until it is resumed.

use std::sync::atomic::{AtomicU32, Ordering};

use mockfetch_core::prelude::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const COLLECTION: &str = "/persons";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: u32,
    pub name: String,
    pub surname: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrudError {
    #[error("No person with id {0}")]
    NotFound(u32),
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

pub struct PersonStore {
    controller: MockFetchController,
    persons: Mutex<Vec<Person>>,
    next_id: AtomicU32,
}

impl PersonStore {
    pub fn new(controller: MockFetchController) -> Self {
        Self {
            controller,
            persons: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// A store pre-filled with a few people, the way the demo starts out.
    pub fn demo(controller: MockFetchController) -> Self {
        let store = Self::new(controller);
        {
            let mut persons = store.persons.lock();
            for (name, surname) in [("Hans", "Emil"), ("Max", "Mustermann"), ("Roman", "Tisch")] {
                persons.push(Person {
                    id: store.next_id.fetch_add(1, Ordering::Relaxed),
                    name: name.into(),
                    surname: surname.into(),
                });
            }
        }
        store
    }

    pub fn controller(&self) -> &MockFetchController {
        &self.controller
    }

    pub async fn list(&self) -> Result<Vec<Person>, CrudError> {
        mock_fetch(&self.controller, COLLECTION, RequestInit::get()).await?;
        Ok(self.persons.lock().clone())
    }

    pub async fn create(&self, name: &str, surname: &str) -> Result<Person, CrudError> {
        let init = RequestInit::with_method("POST").body(format!("{name} {surname}"));
        mock_fetch(&self.controller, COLLECTION, init).await?;

        let person = Person {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.to_owned(),
            surname: surname.to_owned(),
        };
        debug!(id = person.id, "person created");
        self.persons.lock().push(person.clone());
        Ok(person)
    }

    pub async fn update(&self, id: u32, name: &str, surname: &str) -> Result<Person, CrudError> {
        let init = RequestInit::with_method("PUT").body(format!("{name} {surname}"));
        mock_fetch(&self.controller, format!("{COLLECTION}/{id}"), init).await?;

        let mut persons = self.persons.lock();
        let person = persons
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(CrudError::NotFound(id))?;
        person.name = name.to_owned();
        person.surname = surname.to_owned();
        debug!(id, "person updated");
        Ok(person.clone())
    }

    pub async fn delete(&self, id: u32) -> Result<Person, CrudError> {
        let init = RequestInit::with_method("DELETE");
        mock_fetch(&self.controller, format!("{COLLECTION}/{id}"), init).await?;

        let mut persons = self.persons.lock();
        let index = persons
            .iter()
            .position(|p| p.id == id)
            .ok_or(CrudError::NotFound(id))?;
        debug!(id, "person deleted");
        Ok(persons.remove(index))
    }
}
