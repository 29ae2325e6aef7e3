//! Source based routing setup and teardown
//!
//! Every address assigned to an interface gets a policy rule that sends
//! traffic originating from it into a dedicated routing table. That table is
//! populated with a default route and the interface routes that used to live
//! in the main table.

use crate::error::RouteError;
use crate::routing::rules::{default_destination, host_network, rule_owned_by, should_migrate};
use crate::routing::table::{next_table_id, FIRST_TABLE_ID};
use crate::routing::{Family, IpAssignment, RouteEntry, RouteManager, RuleEntry, RuleFilter};
use tracing::{debug, info, warn};

/// Drives rule and route changes for one interface through a [`RouteManager`]
pub struct SourceRouter<M> {
    manager: M,
    first_table_id: u32,
}

impl<M: RouteManager> SourceRouter<M> {
    pub fn new(manager: M) -> Self {
        Self {
            manager,
            first_table_id: FIRST_TABLE_ID,
        }
    }

    /// Start table allocation at `first_table_id` instead of the default floor
    pub fn with_first_table_id(mut self, first_table_id: u32) -> Self {
        self.first_table_id = first_table_id;
        self
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Install source rules for `assignments` on `interface`.
    ///
    /// With `fixed_table` every rule points at that table and no route is
    /// touched. Otherwise each assignment gets its own table, allocated above
    /// the tables already in use on the host.
    pub async fn provision(
        &self,
        assignments: &[IpAssignment],
        interface: &str,
        fixed_table: Option<u32>,
    ) -> Result<(), RouteError> {
        match fixed_table {
            Some(table) => self.provision_with_table(assignments, table).await,
            None => self.provision_auto(assignments, interface).await,
        }
    }

    async fn provision_with_table(
        &self,
        assignments: &[IpAssignment],
        table: u32,
    ) -> Result<(), RouteError> {
        for assignment in assignments {
            self.add_source_rule(assignment, table).await?;
        }
        Ok(())
    }

    async fn provision_auto(
        &self,
        assignments: &[IpAssignment],
        interface: &str,
    ) -> Result<(), RouteError> {
        let rules = self.manager.list_rules(Family::All).await?;
        let routes = self.manager.list_routes(None, Family::All).await?;

        let link_index = self.manager.resolve_interface(interface).await?;

        // Main table routes of the interface, moved to the per-source tables
        let interface_routes = self
            .manager
            .list_routes(Some(link_index), Family::All)
            .await?;

        let mut candidate = Some(self.first_table_id);
        for assignment in assignments {
            let table = candidate
                .and_then(|candidate| next_table_id(&rules, &routes, candidate))
                .ok_or(RouteError::TablesExhausted(self.first_table_id))?;
            debug!("Routing {} through table {}", assignment, table);
            self.add_source_rule(assignment, table).await?;

            if let Some(gateway) = assignment.gateway {
                info!("Adding default route to gateway {} in table {}", gateway, table);

                let destination = default_destination(assignment.address.ip())?;
                let mut route = RouteEntry::new(table, destination);
                route.gateway = Some(gateway);
                route.link_index = Some(link_index);

                self.manager.add_route(&route).await?;
            }

            for route in interface_routes
                .iter()
                .filter(|route| should_migrate(assignment, route))
            {
                info!("Copying route {} from table {} to {}", route, route.table, table);

                let mut copy = route.clone();
                copy.table = table;
                // Kernel-set flags make the insert into another table fail
                copy.flags = 0;

                // Replace, since the default route above may already be there
                self.manager.replace_route(&copy).await?;
            }

            candidate = table.checked_add(1);
        }

        // Only delete once everything is copied: several assignments may share
        // a subnet and a gateway in it would become unreachable in between.
        for route in &interface_routes {
            info!("Deleting route {} from table {}", route, route.table);
            self.manager.remove_route(route).await?;
        }

        Ok(())
    }

    async fn add_source_rule(&self, assignment: &IpAssignment, table: u32) -> Result<(), RouteError> {
        let source = host_network(assignment.address.ip());
        info!("Set rule for source {} to table {}", source, table);

        self.manager
            .add_rule(&RuleEntry::from_source(source, table))
            .await
    }

    /// Remove the rules whose source is an address still on `interface`.
    ///
    /// Deletion keeps going past failures and reports the last one. A missing
    /// interface means there is nothing left to clean up.
    pub async fn teardown(&self, interface: &str, fixed_table: Option<u32>) -> Result<(), RouteError> {
        let rules = match fixed_table {
            Some(table) => {
                self.manager
                    .list_rules_filtered(Family::All, RuleFilter::Table(table))
                    .await?
            }
            None => self.manager.list_rules(Family::All).await?,
        };

        let link_index = match self.manager.resolve_interface(interface).await {
            Ok(index) => index,
            Err(RouteError::InterfaceNotFound { .. }) => {
                debug!("Interface {} is gone, no rules to tidy", interface);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let addresses = self.manager.list_addresses(link_index, Family::All).await?;

        let mut last_error = None;
        for rule in &rules {
            debug!("Check rule: {:?}", rule);
            if !rule_owned_by(rule, &addresses) {
                continue;
            }

            info!("Delete rule {:?}", rule);
            if let Err(e) = self.manager.delete_rule(rule).await {
                warn!("Failed to delete rule {:?}: {}", rule, e);
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
