use rocket::launch;

#[launch]
fn app() -> _ {
    jobwire_api::rocket()
}
