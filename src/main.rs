#[rocket::launch]
fn rocket() -> _ {
    import_table::rocket()
}
