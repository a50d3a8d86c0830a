//! Reference data upserts, keyed by primary key with last write winning.

use diesel::prelude::*;
use diesel::SqliteConnection;
use log::{debug, warn};

use crate::db::models as dbm;
use crate::models::{invoicing, pos};
use crate::schema;

fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

pub fn upsert_location(conn: &mut SqliteConnection, location_guid: &str, info: &pos::RestaurantInfo) -> QueryResult<usize> {
    use schema::locations::dsl as L;

    let general = info.general.clone().unwrap_or_default();
    let address = info.location.clone().unwrap_or_default();
    let new_row = dbm::Location {
        guid: location_guid.to_string(),
        name: text(&general.name),
        location_name: text(&general.location_name),
        timezone: text(&general.time_zone),
        address: text(&address.address1),
        city: text(&address.city),
        state: text(&address.state_code),
        zip: text(&address.zip_code),
    };

    diesel::insert_into(L::locations)
        .values(&new_row)
        .on_conflict(L::guid)
        .do_update()
        .set((
            L::name.eq(new_row.name.clone()),
            L::location_name.eq(new_row.location_name.clone()),
            L::timezone.eq(new_row.timezone.clone()),
            L::address.eq(new_row.address.clone()),
            L::city.eq(new_row.city.clone()),
            L::state.eq(new_row.state.clone()),
            L::zip.eq(new_row.zip.clone()),
        ))
        .execute(conn)
}

pub fn upsert_sales_categories(
    conn: &mut SqliteConnection,
    location_guid: &str,
    categories: &[pos::SalesCategory],
) -> QueryResult<usize> {
    use schema::sales_categories::dsl as S;

    let mut written = 0;
    for c in categories.iter().filter(|c| !c.guid.is_empty()) {
        let new_row = dbm::SalesCategory {
            guid: c.guid.clone(),
            location_guid: location_guid.to_string(),
            name: text(&c.name),
        };
        written += diesel::insert_into(S::sales_categories)
            .values(&new_row)
            .on_conflict(S::guid)
            .do_update()
            .set((S::location_guid.eq(new_row.location_guid.clone()), S::name.eq(new_row.name.clone())))
            .execute(conn)?;
    }
    Ok(written)
}

pub fn upsert_revenue_centers(
    conn: &mut SqliteConnection,
    location_guid: &str,
    centers: &[pos::RevenueCenter],
) -> QueryResult<usize> {
    use schema::revenue_centers::dsl as R;

    let mut written = 0;
    for c in centers.iter().filter(|c| !c.guid.is_empty()) {
        let new_row = dbm::RevenueCenter {
            guid: c.guid.clone(),
            location_guid: location_guid.to_string(),
            name: text(&c.name),
        };
        written += diesel::insert_into(R::revenue_centers)
            .values(&new_row)
            .on_conflict(R::guid)
            .do_update()
            .set((R::location_guid.eq(new_row.location_guid.clone()), R::name.eq(new_row.name.clone())))
            .execute(conn)?;
    }
    Ok(written)
}

pub fn upsert_dining_options(
    conn: &mut SqliteConnection,
    location_guid: &str,
    options: &[pos::DiningOption],
) -> QueryResult<usize> {
    use schema::dining_options::dsl as D;

    let mut written = 0;
    for o in options.iter().filter(|o| !o.guid.is_empty()) {
        let new_row = dbm::DiningOption {
            guid: o.guid.clone(),
            location_guid: location_guid.to_string(),
            name: text(&o.name),
            behavior: text(&o.behavior),
        };
        written += diesel::insert_into(D::dining_options)
            .values(&new_row)
            .on_conflict(D::guid)
            .do_update()
            .set((
                D::location_guid.eq(new_row.location_guid.clone()),
                D::name.eq(new_row.name.clone()),
                D::behavior.eq(new_row.behavior.clone()),
            ))
            .execute(conn)?;
    }
    Ok(written)
}

/// Upsert employees and each of their jobs. Returns the number of employees written.
pub fn upsert_employees(conn: &mut SqliteConnection, location_guid: &str, employees: &[pos::Employee]) -> QueryResult<usize> {
    use schema::employee_jobs::dsl as J;
    use schema::employees::dsl as E;

    let mut written = 0;
    for emp in employees {
        if emp.guid.is_empty() {
            warn!("Refs: skipping employee without guid");
            continue;
        }
        let new_row = dbm::Employee {
            guid: emp.guid.clone(),
            location_guid: location_guid.to_string(),
            external_id: text(&emp.external_employee_id),
            first_name: text(&emp.first_name),
            last_name: text(&emp.last_name),
            email: text(&emp.email),
            deleted: emp.deleted.unwrap_or(false),
        };
        written += diesel::insert_into(E::employees)
            .values(&new_row)
            .on_conflict(E::guid)
            .do_update()
            .set((
                E::location_guid.eq(new_row.location_guid.clone()),
                E::external_id.eq(new_row.external_id.clone()),
                E::first_name.eq(new_row.first_name.clone()),
                E::last_name.eq(new_row.last_name.clone()),
                E::email.eq(new_row.email.clone()),
                E::deleted.eq(new_row.deleted),
            ))
            .execute(conn)?;

        for job in emp.jobs.as_deref().unwrap_or_default().iter().filter(|j| !j.guid.is_empty()) {
            let job_row = dbm::EmployeeJob {
                guid: job.guid.clone(),
                employee_guid: emp.guid.clone(),
                title: text(&job.title),
                wage_type: text(&job.wage_type),
                wage_amount: job.wage_amount.filter(|w| w.is_finite()).unwrap_or(0.0),
            };
            diesel::insert_into(J::employee_jobs)
                .values(&job_row)
                .on_conflict((J::guid, J::employee_guid))
                .do_update()
                .set((
                    J::title.eq(job_row.title.clone()),
                    J::wage_type.eq(job_row.wage_type.clone()),
                    J::wage_amount.eq(job_row.wage_amount),
                ))
                .execute(conn)?;
        }
    }
    debug!("Refs: upserted {} employee(s) for {}", written, location_guid);
    Ok(written)
}

pub fn upsert_invoice_units(conn: &mut SqliteConnection, units: &[invoicing::RestaurantUnit]) -> QueryResult<usize> {
    use schema::invoice_units::dsl as U;

    let mut written = 0;
    for unit in units {
        let Some(id) = unit.id.clone().filter(|id| !id.is_empty()) else {
            warn!("Refs: skipping restaurant unit without id");
            continue;
        };
        let new_row = dbm::InvoiceUnit { id, name: text(&unit.name) };
        written += diesel::insert_into(U::invoice_units)
            .values(&new_row)
            .on_conflict(U::id)
            .do_update()
            .set(U::name.eq(new_row.name.clone()))
            .execute(conn)?;
    }
    Ok(written)
}

pub fn upsert_invoice_categories(
    conn: &mut SqliteConnection,
    unit_id: &str,
    categories: &[invoicing::Category],
) -> QueryResult<usize> {
    use schema::invoice_categories::dsl as C;

    let mut written = 0;
    for c in categories {
        let Some(category_id) = c.category_id.clone().filter(|id| !id.is_empty()) else {
            warn!("Refs: skipping invoice category without id");
            continue;
        };
        let new_row = dbm::InvoiceCategory {
            category_id,
            restaurant_unit_id: unit_id.to_string(),
            category_name: text(&c.category_name),
            category_type: text(&c.category_type),
            accounting_code: c.accounting_code.clone(),
        };
        written += diesel::insert_into(C::invoice_categories)
            .values(&new_row)
            .on_conflict((C::category_id, C::restaurant_unit_id))
            .do_update()
            .set((
                C::category_name.eq(new_row.category_name.clone()),
                C::category_type.eq(new_row.category_type.clone()),
                C::accounting_code.eq(new_row.accounting_code.clone()),
            ))
            .execute(conn)?;
    }
    Ok(written)
}

pub fn upsert_invoice_vendors(conn: &mut SqliteConnection, unit_id: &str, vendors: &[invoicing::Vendor]) -> QueryResult<usize> {
    use schema::invoice_vendors::dsl as V;

    let mut written = 0;
    for v in vendors {
        let Some(vendor_id) = v.vendor_id.clone().filter(|id| !id.is_empty()) else {
            warn!("Refs: skipping vendor without id");
            continue;
        };
        let new_row = dbm::InvoiceVendor {
            vendor_id,
            restaurant_unit_id: unit_id.to_string(),
            vendor_name: text(&v.vendor_name),
            central_vendor_id: text(&v.central_vendor_id),
        };
        written += diesel::insert_into(V::invoice_vendors)
            .values(&new_row)
            .on_conflict((V::vendor_id, V::restaurant_unit_id))
            .do_update()
            .set((
                V::vendor_name.eq(new_row.vendor_name.clone()),
                V::central_vendor_id.eq(new_row.central_vendor_id.clone()),
            ))
            .execute(conn)?;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::test_connection;

    fn employee(guid: &str, first: &str, wage: f64) -> pos::Employee {
        pos::Employee {
            guid: guid.into(),
            first_name: Some(first.into()),
            last_name: Some("Novak".into()),
            jobs: Some(vec![pos::EmployeeJob {
                guid: "job-server".into(),
                title: Some("Server".into()),
                wage_type: Some("HOURLY".into()),
                wage_amount: Some(wage),
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn employees_and_jobs_last_write_wins() {
        use schema::employee_jobs::dsl as J;
        use schema::employees::dsl as E;

        let mut conn = test_connection();
        upsert_employees(&mut conn, "loc-1", &[employee("emp-1", "Ana", 14.0)]).expect("first");
        upsert_employees(&mut conn, "loc-1", &[employee("emp-1", "Anna", 16.5)]).expect("second");

        let rows: Vec<dbm::Employee> = E::employees.select(dbm::Employee::as_select()).load(&mut conn).expect("load");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].first_name, "Anna");

        let jobs: Vec<dbm::EmployeeJob> = J::employee_jobs.select(dbm::EmployeeJob::as_select()).load(&mut conn).expect("load");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].wage_amount, 16.5);
    }

    #[test]
    fn location_fields_come_from_restaurant_info() {
        use schema::locations::dsl as L;

        let mut conn = test_connection();
        let info = pos::RestaurantInfo {
            guid: "loc-1".into(),
            general: Some(pos::RestaurantGeneral {
                name: Some("Cafe Lipa".into()),
                location_name: Some("Downtown".into()),
                time_zone: Some("America/Chicago".into()),
                ..Default::default()
            }),
            location: Some(pos::RestaurantLocation {
                city: Some("Springfield".into()),
                ..Default::default()
            }),
        };
        upsert_location(&mut conn, "loc-1", &info).expect("upsert");
        let row: dbm::Location = L::locations.select(dbm::Location::as_select()).first(&mut conn).expect("row");
        assert_eq!(row.timezone, "America/Chicago");
        assert_eq!(row.city, "Springfield");
        assert_eq!(row.display_name(), "Downtown");
    }

    #[test]
    fn invoice_rows_without_ids_are_skipped() {
        let mut conn = test_connection();
        let vendors = vec![
            invoicing::Vendor {
                vendor_id: Some("v-1".into()),
                vendor_name: Some("Sysco".into()),
                central_vendor_id: None,
            },
            invoicing::Vendor::default(),
        ];
        assert_eq!(upsert_invoice_vendors(&mut conn, "unit-1", &vendors).expect("upsert"), 1);

        let categories = vec![invoicing::Category {
            category_id: Some("c-1".into()),
            category_name: Some("Produce".into()),
            ..Default::default()
        }];
        assert_eq!(upsert_invoice_categories(&mut conn, "unit-1", &categories).expect("upsert"), 1);
        let renamed = vec![invoicing::Category {
            category_id: Some("c-1".into()),
            category_name: Some("Fresh Produce".into()),
            ..Default::default()
        }];
        upsert_invoice_categories(&mut conn, "unit-1", &renamed).expect("upsert again");

        use schema::invoice_categories::dsl as C;
        let names: Vec<String> = C::invoice_categories.select(C::category_name).load(&mut conn).expect("load");
        assert_eq!(names, vec!["Fresh Produce".to_string()]);
    }
}
